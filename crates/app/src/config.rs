use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use workshop_core::engine::{
    CompletionEvidence, EngineConfig, ForwardNavigation, PrerequisitePolicy, ResetPolicy,
};
use workshop_core::model::{AssessmentType, StepId, UserId, Workshop};

pub const DEFAULT_DB_URL: &str = "sqlite:workshop.sqlite3?mode=rwc";
pub const DEFAULT_LOG_FILTER: &str = "workshop=info,services=info,storage=info,workshop_core=info";

#[derive(Debug, Parser)]
#[command(name = "workshop")]
#[command(about = "Track and unlock workshop steps for a learner")]
pub struct Cli {
    /// SQLite URL for assessments and progress
    #[arg(long, env = "WORKSHOP_DB_URL", default_value = DEFAULT_DB_URL)]
    pub db_url: String,

    /// Remote navigation-progress API; progress is stored there when set
    #[arg(long, env = "WORKSHOP_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the remote API
    #[arg(long, env = "WORKSHOP_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Log filter, e.g. `info` or `services=debug`
    #[arg(long, env = "WORKSHOP_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(flatten)]
    pub policies: PolicyArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct PolicyArgs {
    #[arg(long, env = "WORKSHOP_RESET_POLICY", value_enum, default_value_t = ResetPolicyArg::OnMissingAssessments)]
    pub reset_policy: ResetPolicyArg,

    #[arg(long, env = "WORKSHOP_FORWARD_NAVIGATION", value_enum, default_value_t = ForwardNavigationArg::AutoComplete)]
    pub forward_navigation: ForwardNavigationArg,

    #[arg(long, env = "WORKSHOP_PREREQUISITES", value_enum, default_value_t = PrerequisiteArg::Backfill)]
    pub prerequisites: PrerequisiteArg,

    #[arg(long, env = "WORKSHOP_EVIDENCE", value_enum, default_value_t = EvidenceArg::Exists)]
    pub evidence: EvidenceArg,
}

impl PolicyArgs {
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            reset_policy: self.reset_policy.into(),
            forward_navigation: self.forward_navigation.into(),
            prerequisites: self.prerequisites.into(),
            evidence: self.evidence.into(),
        }
    }
}

/// Turn a bare path or relative `sqlite:` URL into an absolute `sqlite://` one.
///
/// In-memory URLs and URLs that are already absolute pass through. Query
/// parameters such as `mode=rwc` are kept.
#[must_use]
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("sqlite::memory:")
        || trimmed.starts_with("sqlite://")
        || trimmed.starts_with("sqlite:file:")
    {
        return trimmed.to_owned();
    }

    let rest = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };
    let path = Path::new(path);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    match query {
        Some(query) => format!("sqlite://{}?{query}", absolute.display()),
        None => format!("sqlite://{}", absolute.display()),
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the normalized progress record
    Status {
        #[arg(long)]
        user: UserId,
        #[arg(long, default_value = "ast")]
        workshop: Workshop,
    },
    /// Mark a step completed
    Complete {
        #[arg(long)]
        user: UserId,
        step: StepId,
    },
    /// Navigate to a step
    Visit {
        #[arg(long)]
        user: UserId,
        step: StepId,
    },
    /// Report video watching for a step
    Video {
        #[arg(long)]
        user: UserId,
        step: StepId,
        #[arg(long)]
        percent: f64,
        #[arg(long)]
        position: Option<f64>,
    },
    /// Store an assessment artifact (payload is JSON)
    Record {
        #[arg(long)]
        user: UserId,
        kind: AssessmentType,
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// List stored assessment artifacts
    Assessments {
        #[arg(long)]
        user: UserId,
    },
    /// Delete all assessments and progress of a user
    Reset {
        #[arg(long)]
        user: UserId,
    },
    /// Rewrite legacy-encoded progress rows in the clean format
    MigrateLegacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResetPolicyArg {
    OnMissingAssessments,
    ExplicitOnly,
}

impl From<ResetPolicyArg> for ResetPolicy {
    fn from(arg: ResetPolicyArg) -> Self {
        match arg {
            ResetPolicyArg::OnMissingAssessments => ResetPolicy::OnMissingAssessments,
            ResetPolicyArg::ExplicitOnly => ResetPolicy::ExplicitOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ForwardNavigationArg {
    AutoComplete,
    UnlockOnly,
}

impl From<ForwardNavigationArg> for ForwardNavigation {
    fn from(arg: ForwardNavigationArg) -> Self {
        match arg {
            ForwardNavigationArg::AutoComplete => ForwardNavigation::AutoCompleteContent,
            ForwardNavigationArg::UnlockOnly => ForwardNavigation::UnlockOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PrerequisiteArg {
    Backfill,
    Reject,
}

impl From<PrerequisiteArg> for PrerequisitePolicy {
    fn from(arg: PrerequisiteArg) -> Self {
        match arg {
            PrerequisiteArg::Backfill => PrerequisitePolicy::Backfill,
            PrerequisiteArg::Reject => PrerequisitePolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EvidenceArg {
    Exists,
    ValidPayload,
}

impl From<EvidenceArg> for CompletionEvidence {
    fn from(arg: EvidenceArg) -> Self {
        match arg {
            EvidenceArg::Exists => CompletionEvidence::Exists,
            EvidenceArg::ValidPayload => CompletionEvidence::ValidPayload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_defaults() {
        let cli = Cli::try_parse_from(["workshop", "status", "--user", "7"]).unwrap();
        assert_eq!(cli.policies.engine_config(), EngineConfig::default());
        match cli.command {
            Command::Status { user, workshop } => {
                assert_eq!(user, UserId::new(7));
                assert_eq!(workshop, Workshop::Ast);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_policies_and_typed_arguments() {
        let cli = Cli::try_parse_from([
            "workshop",
            "--reset-policy",
            "explicit-only",
            "--prerequisites",
            "reject",
            "video",
            "--user",
            "3",
            "ia-2-1",
            "--percent",
            "55.5",
        ])
        .unwrap();
        let config = cli.policies.engine_config();
        assert_eq!(config.reset_policy, ResetPolicy::ExplicitOnly);
        assert_eq!(config.prerequisites, PrerequisitePolicy::Reject);
        match cli.command {
            Command::Video { step, percent, position, .. } => {
                assert_eq!(step.as_str(), "ia-2-1");
                assert!((percent - 55.5).abs() < f64::EPSILON);
                assert_eq!(position, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn log_filter_names_this_binary() {
        let root = module_path!().split("::").next().unwrap();
        assert_eq!(root, "workshop");
        assert!(
            DEFAULT_LOG_FILTER
                .split(',')
                .any(|directive| directive == format!("{root}=info"))
        );
    }

    #[test]
    fn sqlite_urls_become_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_sqlite_url("/tmp/w.db"), "sqlite:///tmp/w.db");
        assert_eq!(
            normalize_sqlite_url(" sqlite:/tmp/w.db?mode=rwc "),
            "sqlite:///tmp/w.db?mode=rwc"
        );
        let relative = normalize_sqlite_url(DEFAULT_DB_URL);
        assert!(relative.starts_with("sqlite:///"));
        assert!(relative.ends_with("workshop.sqlite3?mode=rwc"));
    }

    #[test]
    fn rejects_malformed_step_ids() {
        assert!(Cli::try_parse_from(["workshop", "complete", "--user", "1", "step-one"]).is_err());
    }
}
