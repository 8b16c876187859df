// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a commented shipyard.yml template covering every pipeline stage.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::LogicalName;

use super::CONFIG_FILENAME;

/// Write a template config into `dir`. Returns the path written.
pub fn init_config(dir: &Path, app_name: &str, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let name = LogicalName::new(app_name)?;
    std::fs::write(&config_path, template_yaml(&name))?;

    Ok(config_path)
}

pub fn template_yaml(name: &LogicalName) -> String {
    format!(
        r#"app:
  name: {name}

pipeline:
  max_parallel: 4
  # timeout: 1h
  # stages:
  #   monitoring:
  #     triggers: [push]

secrets:
  DOCKER_HUB_USERNAME: {{ env: DOCKER_HUB_USERNAME }}
  DOCKER_HUB_TOKEN: {{ env: DOCKER_HUB_TOKEN }}
  SSH_PRIVATE_KEY: {{ env: SSH_PRIVATE_KEY }}
  SSH_PUBLIC_KEY: {{ env: SSH_PUBLIC_KEY }}
  DB_USER: {{ env: DB_USER, default: app }}
  DB_PASS: {{ env: DB_PASS }}
  DB_NAME: {{ env: DB_NAME, default: {name} }}
  NODE_ENV: production

prepare:
  commands:
    - name: install
      run: npm ci

test:
  commands:
    - name: unit
      run: npm test

images:
  frontend:
    image: example/{name}-frontend:latest
    context: frontend
  backend:
    image: example/{name}-backend:latest
    context: backend

provision:
  program: ./provider
  instance_type: t3.small
  reachability_port: 22

deploy:
  user: ubuntu
  directory: /opt/{name}
  host_key:
    # Fresh instances present a key nobody has seen yet.
    trust_on_first_use: true
  artifacts:
    - docker-compose.yml
  env_keys:
    - DB_USER
    - DB_PASS
    - DB_NAME
    - NODE_ENV
  steps:
    - name: pull
      command: "{{compose}} pull"
    - name: up
      command: "{{compose}} up -d --remove-orphans"
    - name: prune
      command: docker image prune -f
      tolerant: true

verify:
  # any: one healthy probe passes the release; all: every probe must pass
  policy: any
  probes:
    - name: frontend
      port: 80
    - name: backend
      port: 8080
      path: /health
  poll:
    interval: 20s
    attempts: 8

monitoring:
  commands:
    - name: status
      run: echo "deployed {name}"
"#
    )
}
