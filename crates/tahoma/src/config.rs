//! CLI configuration: thin wrapper around `tahoma_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--user, --base-url, --insecure, --timeout).

use std::time::Duration;

use tahoma_core::{ConnectionConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use tahoma_config::{Config, Profile, config_path, load_config, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.profile_name(global.profile.as_deref()).to_owned()
}

/// Build a `ConnectionConfig` from the config file, the active profile and
/// CLI overrides.
///
/// Without any profile, flags and `TAHOMA_*` variables alone must supply
/// the account.
pub fn resolve_connection_config(global: &GlobalOpts) -> Result<ConnectionConfig, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let fallback = Profile::default();
    let profile = match cfg.profiles.get(&profile_name) {
        Some(p) => p,
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
            });
        }
        None => {
            if global.user.is_none() {
                return Err(CliError::NoConfig {
                    path: config_path().display().to_string(),
                });
            }
            &fallback
        }
    };

    let user = match global.user {
        Some(ref user) => user.clone(),
        None => tahoma_config::resolve_user(profile, &profile_name)?,
    };
    let password = tahoma_config::resolve_password(profile, &profile_name)?;

    let mut config = tahoma_config::build_connection_config(profile, &cfg.defaults, user, password)?;

    if let Some(ref raw) = global.base_url {
        config.base_url = tahoma_config::parse_base_url(raw)?;
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout.filter(|s| *s > 0) {
        config.timeout = Duration::from_secs(secs);
    }

    Ok(config)
}

/// Comma-separated sorted profile names, or `(none)`.
pub fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<_> = cfg.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}
