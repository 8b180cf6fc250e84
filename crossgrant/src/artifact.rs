//! Verification-artifact generation.
//!
//! The rendered script is self-contained: it embeds the literal role ARN,
//! external ID, bucket and invoking profile so it can run independently of
//! the orchestrator's own state.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;
use uuid::Uuid;

use crate::errors::{CrossgrantError, Result};

/// The embedded script template.
pub const SCRIPT_TEMPLATE: &str = include_str!("../templates/verify.sh.tmpl");

/// A complete, typed set of values for every placeholder the template
/// references. Constructing one guarantees there is a provider for each
/// placeholder; rendering still double-checks.
#[derive(Debug, Clone)]
pub struct BindingSet {
    /// The assumable role's ARN.
    pub role_arn: String,
    /// The shared external ID.
    pub external_id: String,
    /// The shared bucket.
    pub bucket_name: String,
    /// Profile the script assumes the role from.
    pub consumer_profile: String,
    /// Assume-role session duration in seconds.
    pub session_duration_secs: u32,
    /// Key of the probe object, unique per generation.
    pub probe_key: String,
    /// Generation timestamp.
    pub generated_at: String,
}

impl BindingSet {
    /// Builds a binding set with a fresh probe key and timestamp.
    #[must_use]
    pub fn new(
        role_arn: impl Into<String>,
        external_id: impl Into<String>,
        bucket_name: impl Into<String>,
        consumer_profile: impl Into<String>,
        session_duration_secs: u32,
    ) -> Self {
        Self {
            role_arn: role_arn.into(),
            external_id: external_id.into(),
            bucket_name: bucket_name.into(),
            consumer_profile: consumer_profile.into(),
            session_duration_secs,
            probe_key: format!("crossgrant-probe-{}", Uuid::new_v4()),
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("role_arn", self.role_arn.clone()),
            ("external_id", self.external_id.clone()),
            ("bucket_name", self.bucket_name.clone()),
            ("consumer_profile", self.consumer_profile.clone()),
            ("session_duration", self.session_duration_secs.to_string()),
            ("probe_key", self.probe_key.clone()),
            ("generated_at", self.generated_at.clone()),
        ]
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"\{\{([a-z_]+)\}\}").expect("placeholder pattern is valid")
    })
}

/// Substitutes every placeholder token and verifies none remain.
///
/// A leftover placeholder means the binding set and the template have
/// drifted apart; that is an internal inconsistency, surfaced as
/// [`CrossgrantError::UnresolvedPlaceholder`].
pub fn render(template: &str, bindings: &BindingSet) -> Result<String> {
    let mut text = template.to_string();
    for (name, value) in bindings.pairs() {
        text = text.replace(&format!("{{{{{name}}}}}"), &value);
    }

    let leftover: Vec<String> = placeholder_pattern()
        .captures_iter(&text)
        .map(|capture| capture[1].to_string())
        .collect();
    if !leftover.is_empty() {
        return Err(CrossgrantError::UnresolvedPlaceholder {
            placeholders: leftover,
        });
    }

    Ok(text)
}

/// Writes the artifact and marks it executable.
///
/// The content goes to a sibling temp file first and is renamed into place,
/// so a failure partway never leaves a half-written script behind.
pub fn write_executable(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("sh.partial");

    let write_result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o755))?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if write_result.is_err() {
        let _ = fs::remove_file(&tmp);
    } else {
        info!(path = %path.display(), "verification script written");
    }
    write_result
}
