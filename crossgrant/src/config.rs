//! Interactive session collection.
//!
//! The CLI takes no flags; every value is gathered through a [`Prompt`].
//! The trait seam keeps the collection logic testable with scripted answers.

use std::io::{self, BufRead, Write};

use tracing::debug;
use uuid::Uuid;

use crate::errors::Result;
use crate::session::{OnExisting, Session, TeardownScope, DEFAULT_CONFIRM_TOKEN};

/// Interactive question source.
pub trait Prompt: Send + Sync {
    /// Asks a question, returning the operator's answer or `default` when
    /// the answer is empty.
    fn ask(&self, question: &str, default: &str) -> io::Result<String>;

    /// Asks a yes/no question. Defaults to no.
    fn confirm(&self, question: &str) -> io::Result<bool>;
}

/// A [`Prompt`] reading answers from standard input.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompt;

impl StdinPrompt {
    fn read_line(question: &str) -> io::Result<String> {
        let mut out = io::stderr();
        write!(out, "{question} ")?;
        out.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

impl Prompt for StdinPrompt {
    fn ask(&self, question: &str, default: &str) -> io::Result<String> {
        let shown = if default.is_empty() {
            format!("{question}:")
        } else {
            format!("{question} [{default}]:")
        };
        let answer = Self::read_line(&shown)?;
        if answer.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(answer)
        }
    }

    fn confirm(&self, question: &str) -> io::Result<bool> {
        let answer = Self::read_line(&format!("{question} [y/N]:"))?;
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

/// Collects a validated [`Session`] interactively.
///
/// The external ID default is generated fresh per invocation rather than
/// being a fixed shared secret; an operator re-running against an existing
/// deployment must re-enter the ID that deployment was created with.
pub fn collect_session(prompt: &dyn Prompt) -> Result<Session> {
    let profile_consumer = prompt.ask("Consumer profile (will assume the role)", "Development")?;
    let profile_producer = prompt.ask("Producer profile (owns bucket and role)", "Production")?;
    let bucket_name = ask_required(prompt, "Bucket to share")?;
    let role_name_prefix = prompt.ask("Role name prefix", "CrossAccountAccess")?;
    let generated_external_id = Uuid::new_v4().to_string();
    let external_id = prompt.ask("External ID", &generated_external_id)?;
    let duration = prompt.ask("Max session duration in seconds", "3600")?;
    let stack_name_prefix = prompt.ask("Stack name prefix", "crossgrant")?;
    let on_existing: OnExisting = prompt
        .ask("When a stack already exists (update/skip/prompt)", "prompt")?
        .parse()?;

    let max_session_duration_secs = duration.trim().parse::<u32>().map_err(|_| {
        crate::errors::CrossgrantError::validation(format!(
            "session duration '{duration}' is not a number"
        ))
    })?;

    debug!(
        consumer = %profile_consumer,
        producer = %profile_producer,
        bucket = %bucket_name,
        "collected session input"
    );

    Session::builder()
        .profile_consumer(profile_consumer)
        .profile_producer(profile_producer)
        .bucket_name(bucket_name)
        .role_name_prefix(role_name_prefix)
        .external_id(external_id)
        .max_session_duration_secs(max_session_duration_secs)
        .stack_name_prefix(stack_name_prefix)
        .on_existing(on_existing)
        .confirm_token(DEFAULT_CONFIRM_TOKEN)
        .build()
}

/// Collects a [`TeardownScope`] interactively.
///
/// Teardown never consumes the bucket, role prefix, external ID, session
/// duration or existing-stack policy, so none of those are asked for.
pub fn collect_teardown_scope(prompt: &dyn Prompt) -> Result<TeardownScope> {
    let profile_consumer = prompt.ask("Consumer profile (will assume the role)", "Development")?;
    let profile_producer = prompt.ask("Producer profile (owns bucket and role)", "Production")?;
    let stack_name_prefix = prompt.ask("Stack name prefix", "crossgrant")?;
    Ok(TeardownScope::new(
        profile_consumer,
        profile_producer,
        stack_name_prefix,
    ))
}

fn ask_required(prompt: &dyn Prompt, question: &str) -> Result<String> {
    // Re-ask instead of failing; the invariant itself is still enforced by
    // Session::validate.
    for _ in 0..3 {
        let answer = prompt.ask(question, "")?;
        if !answer.trim().is_empty() {
            return Ok(answer);
        }
    }
    Ok(String::new())
}
