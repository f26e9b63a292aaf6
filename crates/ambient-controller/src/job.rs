//! Job template for a session's runner.
//!
//! The runner reads everything it needs from its environment; the variable
//! names below are the contract between the controller and the runner image.

use std::collections::BTreeMap;

use ambient_cluster::objects::{
    Capabilities, Container, EmptyDirVolumeSource, EnvVar, EphemeralVolumeSource, Job, JobSpec,
    PodSpec, PodTemplateSpec, ResourceRequirements, SecurityContext, Volume, VolumeClaimSpec,
    VolumeClaimTemplate, VolumeMount,
};
use ambient_core::constants::{
    ANNOTATION_RUNNER_SA, ANNOTATION_RUNNER_TOKEN_SECRET, LABEL_SESSION, RUNNER_TOKEN_KEY,
};
use ambient_core::naming::{job_name, runner_identity_name, runner_token_secret_name};
use ambient_core::resources::{AgenticSession, GitRepository, ProjectSettings};
use ambient_core::{ObjectMeta, Resource};
use ambient_settings::ControllerSettings;
use serde::Serialize;

use crate::errors::ControllerResult;

/// Container name of the runner.
pub const RUNNER_CONTAINER: &str = "ambient-code-runner";

/// Mount point of the scratch volume.
pub const WORKSPACE_MOUNT: &str = "/workspace";

/// Runner secret used when the project settings name none.
pub const DEFAULT_RUNNER_SECRET: &str = "ambient-runner-secrets";

const SCRATCH_VOLUME: &str = "workspace";

/// Everything the template needs besides the session itself.
#[derive(Clone, Debug)]
pub struct JobTemplate<'a> {
    /// Controller settings (image, limits, deadlines).
    pub settings: &'a ControllerSettings,
    /// Callback URL for the runner.
    pub backend_api_url: &'a str,
    /// Tenant settings, if the project has any.
    pub project_settings: Option<&'a ProjectSettings>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryEnv<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clone_path: Option<&'a str>,
}

/// `GIT_REPOSITORIES` value: a JSON array of `{url, branch, clonePath}`.
pub fn repositories_json(repositories: &[GitRepository]) -> ControllerResult<String> {
    let entries: Vec<RepositoryEnv<'_>> = repositories
        .iter()
        .map(|r| RepositoryEnv {
            url: &r.url,
            branch: r.branch.as_deref(),
            clone_path: r.clone_path.as_deref(),
        })
        .collect();
    Ok(serde_json::to_string(&entries)?)
}

/// Content path the runner works in.
pub fn workspace_path(session: &AgenticSession) -> String {
    if let Some(path) = session
        .spec
        .paths
        .as_ref()
        .and_then(|p| p.workspace.as_deref())
        .filter(|p| !p.is_empty())
    {
        return path.to_string();
    }
    match &session.spec.workflow_ref {
        Some(workflow) => format!("/workflows/{}/workspace", workflow.name),
        None => format!("/sessions/{}/workspace", session.metadata.name),
    }
}

impl JobTemplate<'_> {
    /// Runner environment for `session`.
    pub fn env(&self, session: &AgenticSession) -> ControllerResult<Vec<EnvVar>> {
        let spec = &session.spec;
        let meta = &session.metadata;
        let mut env = vec![
            EnvVar::literal("AGENTIC_SESSION_NAME", &meta.name),
            EnvVar::literal("AGENTIC_SESSION_NAMESPACE", meta.namespace_or_empty()),
            EnvVar::literal("PROMPT", &spec.prompt),
            EnvVar::literal("INTERACTIVE", spec.interactive.to_string()),
            EnvVar::literal("LLM_MODEL", &spec.llm_settings.model),
            EnvVar::literal("LLM_TEMPERATURE", spec.llm_settings.temperature.to_string()),
            EnvVar::literal("LLM_MAX_TOKENS", spec.llm_settings.max_tokens.to_string()),
            EnvVar::literal("TIMEOUT", spec.timeout.to_string()),
            EnvVar::literal("BACKEND_API_URL", self.backend_api_url),
            EnvVar::literal("WORKSPACE_PATH", workspace_path(session)),
        ];

        if let Some(git) = &spec.git_config {
            if let Some(user) = &git.user {
                env.extend(user.name.as_deref().map(|n| EnvVar::literal("GIT_USER_NAME", n)));
                env.extend(user.email.as_deref().map(|e| EnvVar::literal("GIT_USER_EMAIL", e)));
            }
            if !git.repositories.is_empty() {
                env.push(EnvVar::literal("GIT_REPOSITORIES", repositories_json(&git.repositories)?));
            }
            if let Some(auth) = &git.authentication {
                if let Some(secret) = auth.ssh_key_secret.as_deref() {
                    env.push(EnvVar::from_secret("GIT_SSH_KEY", secret, "ssh-privatekey", false));
                }
                if let Some(secret) = auth.token_secret.as_deref() {
                    env.push(EnvVar::from_secret("GIT_TOKEN", secret, "token", false));
                }
            }
        }

        if let Some(workflow) = &spec.workflow_ref {
            env.push(EnvVar::literal("WORKFLOW_NAME", &workflow.name));
            if let Some(stage) = workflow.stage {
                env.push(EnvVar::literal("WORKFLOW_STAGE", stage.as_str()));
            }
        }
        if let Some(bot) = &spec.bot_account {
            env.push(EnvVar::literal("BOT_ACCOUNT", &bot.name));
        }

        let runner_secret = self
            .project_settings
            .and_then(|s| s.spec.runner_secrets_name.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_RUNNER_SECRET);
        env.push(EnvVar::from_secret("ANTHROPIC_API_KEY", runner_secret, "ANTHROPIC_API_KEY", true));

        let token_secret = meta
            .annotation(ANNOTATION_RUNNER_TOKEN_SECRET)
            .map_or_else(|| runner_token_secret_name(&meta.name), String::from);
        env.push(EnvVar::from_secret("BOT_TOKEN", &token_secret, RUNNER_TOKEN_KEY, true));

        Ok(env)
    }

    fn resources(&self, session: &AgenticSession) -> ResourceRequirements {
        let overrides = session.spec.resource_overrides.as_ref();
        let cpu = overrides
            .and_then(|o| o.cpu.clone())
            .unwrap_or_else(|| self.settings.default_cpu.clone());
        let memory = overrides
            .and_then(|o| o.memory.clone())
            .unwrap_or_else(|| self.settings.default_memory.clone());
        ResourceRequirements {
            requests: BTreeMap::from([("cpu".to_string(), cpu), ("memory".to_string(), memory.clone())]),
            limits: BTreeMap::from([("memory".to_string(), memory)]),
        }
    }

    fn scratch_volume(&self, session: &AgenticSession) -> Volume {
        let storage_class = session
            .spec
            .resource_overrides
            .as_ref()
            .and_then(|o| o.storage_class.clone());
        match storage_class {
            Some(class) => Volume {
                name: SCRATCH_VOLUME.to_string(),
                empty_dir: None,
                ephemeral: Some(EphemeralVolumeSource {
                    volume_claim_template: VolumeClaimTemplate {
                        spec: VolumeClaimSpec {
                            access_modes: vec!["ReadWriteOnce".to_string()],
                            storage_class_name: Some(class),
                            resources: ResourceRequirements {
                                requests: BTreeMap::from([(
                                    "storage".to_string(),
                                    self.settings.scratch_size_limit.clone(),
                                )]),
                                limits: BTreeMap::new(),
                            },
                        },
                    },
                }),
            },
            None => Volume {
                name: SCRATCH_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource {
                    medium: Some("Memory".to_string()),
                    size_limit: Some(self.settings.scratch_size_limit.clone()),
                }),
                ephemeral: None,
            },
        }
    }

    /// Deadline in seconds: the larger of the configured floor and the
    /// session's own timeout.
    pub fn active_deadline(&self, session: &AgenticSession) -> i64 {
        let secs = self.settings.active_deadline_secs.max(session.spec.timeout);
        i64::try_from(secs).unwrap_or(i64::MAX)
    }

    /// The complete job for `session`, owned by it.
    pub fn build(&self, session: &AgenticSession) -> ControllerResult<Job> {
        let meta = &session.metadata;
        let name = job_name(&meta.name);
        let labels = ObjectMeta::default().with_label(LABEL_SESSION, &meta.name);
        let service_account = meta
            .annotation(ANNOTATION_RUNNER_SA)
            .map_or_else(|| runner_identity_name(&meta.name), String::from);

        let container = Container {
            name: RUNNER_CONTAINER.to_string(),
            image: self.settings.runner_image.clone(),
            image_pull_policy: Some(self.settings.image_pull_policy.clone()),
            env: self.env(session)?,
            resources: Some(self.resources(session)),
            security_context: Some(SecurityContext {
                allow_privilege_escalation: Some(false),
                capabilities: Some(Capabilities {
                    drop: vec!["ALL".to_string()],
                }),
                run_as_non_root: None,
            }),
            volume_mounts: vec![VolumeMount {
                name: SCRATCH_VOLUME.to_string(),
                mount_path: WORKSPACE_MOUNT.to_string(),
            }],
        };

        Ok(Job {
            metadata: ObjectMeta {
                labels: labels.labels.clone(),
                ..ObjectMeta::named(name, meta.namespace_or_empty())
            }
            .owned_by(session.owner_reference()),
            spec: JobSpec {
                backoff_limit: Some(i32::try_from(self.settings.retry_limit).unwrap_or(i32::MAX)),
                active_deadline_seconds: Some(self.active_deadline(session)),
                ttl_seconds_after_finished: None,
                template: PodTemplateSpec {
                    metadata: Some(labels),
                    spec: PodSpec {
                        restart_policy: Some("Never".to_string()),
                        service_account_name: Some(service_account),
                        automount_service_account_token: Some(false),
                        priority_class_name: session
                            .spec
                            .resource_overrides
                            .as_ref()
                            .and_then(|o| o.priority_class.clone()),
                        containers: vec![container],
                        volumes: vec![self.scratch_volume(session)],
                    },
                },
            },
            status: None,
        })
    }
}
