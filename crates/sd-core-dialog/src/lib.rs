//! The conflict/error dialog protocol (spec.md §4.9): the only place a job
//! thread blocks on the foreground. Implemented as an `async fn` the job
//! awaits rather than a literal OS-thread block, per design note §9
//! ("what matters is that the job thread is *the only* one that blocks, and
//! its mutex is never held while running I/O").

use std::{collections::HashSet, path::PathBuf, time::Duration};

use async_trait::async_trait;
use sd_core_task_system::CancellationToken;
use tokio::sync::oneshot;

bitflags::bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct AllowedResponses: u32 {
		const CANCEL      = 1 << 0;
		const SKIP        = 1 << 1;
		const SKIP_ALL    = 1 << 2;
		const RETRY       = 1 << 3;
		const DELETE      = 1 << 4;
		const DELETE_ALL  = 1 << 5;
		const REPLACE     = 1 << 6;
		const REPLACE_ALL = 1 << 7;
		const MERGE       = 1 << 8;
		const MERGE_ALL   = 1 << 9;
		const RENAME      = 1 << 10;
		const PROCEED     = 1 << 11;
		const EMPTY_TRASH = 1 << 12;
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTag {
	Cancel,
	Skip,
	SkipAll,
	Retry,
	Delete,
	DeleteAll,
	Replace,
	ReplaceAll,
	Merge,
	MergeAll,
	Rename,
	Proceed,
	EmptyTrash,
}

/// Extra context a conflict dialog needs that a plain error dialog doesn't,
/// per spec.md §4.9 "Conflict specialization".
#[derive(Debug, Clone)]
pub struct ConflictContext {
	pub source: PathBuf,
	pub target: PathBuf,
	pub destination_dir: PathBuf,
	pub suggested_rename: String,
}

#[derive(Debug, Clone)]
pub struct DialogRequest {
	pub heading: String,
	pub body: String,
	pub details: Option<String>,
	pub allowed: AllowedResponses,
	pub delay_interactivity: bool,
	pub conflict: Option<ConflictContext>,
}

impl DialogRequest {
	#[must_use]
	pub fn new(heading: impl Into<String>, body: impl Into<String>, allowed: AllowedResponses) -> Self {
		Self {
			heading: heading.into(),
			body: body.into(),
			details: None,
			allowed,
			delay_interactivity: false,
			conflict: None,
		}
	}

	#[must_use]
	pub fn with_details(mut self, details: impl Into<String>) -> Self {
		self.details = Some(details.into());
		self
	}

	#[must_use]
	pub fn with_conflict(mut self, conflict: ConflictContext) -> Self {
		self.conflict = Some(conflict);
		self
	}

	#[must_use]
	pub fn with_delay_interactivity(mut self, delay: bool) -> Self {
		self.delay_interactivity = delay;
		self
	}
}

#[derive(Debug, Clone)]
pub struct DialogResponse {
	pub tag: ResponseTag,
	/// Only meaningful for [`ResponseTag::Rename`].
	pub new_name: Option<String>,
}

impl DialogResponse {
	#[must_use]
	pub fn simple(tag: ResponseTag) -> Self {
		Self { tag, new_name: None }
	}

	#[must_use]
	pub fn rename(new_name: impl Into<String>) -> Self {
		Self { tag: ResponseTag::Rename, new_name: Some(new_name.into()) }
	}
}

/// `delay_interactivity = (elapsed > 2s) AND (time_since_last_dialog < 1s)`,
/// per spec.md §4.9 "Long-job behavior".
const LONG_JOB_THRESHOLD: Duration = Duration::from_secs(2);
const INTERACTIVITY_GRACE: Duration = Duration::from_secs(1);

#[must_use]
pub fn should_delay_interactivity(elapsed: Duration, time_since_last_dialog: Duration) -> bool {
	elapsed > LONG_JOB_THRESHOLD && time_since_last_dialog < INTERACTIVITY_GRACE
}

/// Generates a conflict dialog's suggested rename from a fresh listing of
/// the destination directory's existing contents, so the name returned is
/// unique at the moment it's computed (spec.md §8 testable property).
#[must_use]
pub fn suggest_rename(existing_names: &HashSet<String>, file_stem: &str, extension: &str) -> String {
	let mut counter = 2;
	loop {
		let candidate = if extension.is_empty() {
			format!("{file_stem} ({counter})")
		} else {
			format!("{file_stem} ({counter}).{extension}")
		};
		if !existing_names.contains(&candidate) {
			return candidate;
		}
		counter += 1;
	}
}

/// The abstract "ask user" primitive. The core never speaks GUI toolkit
/// types; implementors translate `DialogRequest` into whatever widget stack
/// the host uses.
#[async_trait]
pub trait DialogService: Send + Sync {
	async fn ask(&self, request: DialogRequest, token: &CancellationToken) -> DialogResponse;
}

/// Headless policy used by tests and `apps/cli` for non-interactive runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlessPolicy {
	AlwaysSkip,
	AlwaysReplace,
	AlwaysCancel,
	AlwaysProceed,
}

pub struct PolicyDialogService(pub HeadlessPolicy);

#[async_trait]
impl DialogService for PolicyDialogService {
	async fn ask(&self, request: DialogRequest, _token: &CancellationToken) -> DialogResponse {
		let tag = match self.0 {
			HeadlessPolicy::AlwaysSkip if request.allowed.contains(AllowedResponses::SKIP) => {
				ResponseTag::Skip
			}
			HeadlessPolicy::AlwaysReplace if request.allowed.contains(AllowedResponses::REPLACE) => {
				ResponseTag::Replace
			}
			HeadlessPolicy::AlwaysProceed if request.allowed.contains(AllowedResponses::PROCEED) => {
				ResponseTag::Proceed
			}
			_ => ResponseTag::Cancel,
		};
		DialogResponse::simple(tag)
	}
}

/// Forwards requests to a real UI over a channel and blocks (asynchronously)
/// on its answer, waking early with a synthetic `Cancel` if the job's token
/// trips first — spec.md §4.9 "Cancellation: tripping the job's cancellation
/// token immediately wakes the waiter with a synthetic Cancel response."
pub struct ChannelDialogService {
	sender: tokio::sync::mpsc::UnboundedSender<(DialogRequest, oneshot::Sender<DialogResponse>)>,
}

impl ChannelDialogService {
	#[must_use]
	pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<(DialogRequest, oneshot::Sender<DialogResponse>)>)
	{
		let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
		(Self { sender: tx }, rx)
	}
}

#[async_trait]
impl DialogService for ChannelDialogService {
	async fn ask(&self, request: DialogRequest, token: &CancellationToken) -> DialogResponse {
		let (resp_tx, resp_rx) = oneshot::channel();
		if self.sender.send((request, resp_tx)).is_err() {
			return DialogResponse::simple(ResponseTag::Cancel);
		}

		// Pause semantics: the job's progress is marked paused for the
		// duration of this wait by the caller (sd-core-job-system), which
		// holds the same token and watches `is_paused`.
		token.set_paused(true);
		let result = tokio::select! {
			resp = resp_rx => resp.unwrap_or_else(|_| DialogResponse::simple(ResponseTag::Cancel)),
			() = token.interrupter().interrupted_cancel_only() => {
				DialogResponse::simple(ResponseTag::Cancel)
			}
		};
		token.set_paused(false);
		result
	}
}

/// The "opaque passphrase prompt" spec.md §6 lists separately from the
/// conflict/error dialog primitive: extract's retry loop needs just a
/// yes/no-shaped answer (a string, or none if the user backed out), not the
/// full `DialogRequest`/`ResponseTag` machinery.
#[async_trait]
pub trait PassphrasePrompt: Send + Sync {
	async fn ask(&self, archive: &std::path::Path, token: &CancellationToken) -> Option<String>;
}

/// Used by tests and any host with no interactive passphrase UI wired up;
/// always declines, which the extract loop reads the same as a user
/// cancelling the prompt.
#[derive(Debug, Default)]
pub struct NoopPassphrasePrompt;

impl NoopPassphrasePrompt {
	#[must_use]
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl PassphrasePrompt for NoopPassphrasePrompt {
	async fn ask(&self, _archive: &std::path::Path, _token: &CancellationToken) -> Option<String> {
		None
	}
}

/// Small extension so `ChannelDialogService` only wakes early on an actual
/// cancel, not a pause (a job thread mid-dialog is already as paused as it
/// gets).
trait InterruptedCancelOnly {
	#[allow(async_fn_in_trait)]
	async fn interrupted_cancel_only(&self);
}

impl InterruptedCancelOnly for sd_core_task_system::Interrupter {
	async fn interrupted_cancel_only(&self) {
		loop {
			if self.is_cancelled() {
				return;
			}
			tokio::time::sleep(Duration::from_millis(25)).await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn delay_interactivity_true_only_when_long_job_interrupts_recent_dialog() {
		assert!(should_delay_interactivity(Duration::from_secs(3), Duration::from_millis(500)));
		assert!(!should_delay_interactivity(Duration::from_secs(1), Duration::from_millis(500)));
		assert!(!should_delay_interactivity(Duration::from_secs(3), Duration::from_secs(2)));
	}

	#[test]
	fn suggest_rename_finds_first_free_counter() {
		let mut existing = HashSet::new();
		existing.insert("x (2).txt".to_owned());
		let name = suggest_rename(&existing, "x", "txt");
		assert_eq!(name, "x (3).txt");
	}

	#[tokio::test]
	async fn policy_service_answers_without_blocking() {
		let service = PolicyDialogService(HeadlessPolicy::AlwaysSkip);
		let token = CancellationToken::new();
		let req = DialogRequest::new("Conflict", "exists", AllowedResponses::SKIP | AllowedResponses::CANCEL);
		let resp = service.ask(req, &token).await;
		assert_eq!(resp.tag, ResponseTag::Skip);
	}

	#[tokio::test]
	async fn cancelling_token_wakes_channel_service_with_synthetic_cancel() {
		let (service, mut rx) = ChannelDialogService::new();
		let token = CancellationToken::new();
		let token2 = token.clone();

		tokio::spawn(async move {
			// Simulate a UI that never answers, then a cancel arrives.
			let _ = rx.recv().await;
			tokio::time::sleep(Duration::from_millis(20)).await;
			token2.cancel();
		});

		let req = DialogRequest::new("Error", "oops", AllowedResponses::CANCEL | AllowedResponses::RETRY);
		let resp = service.ask(req, &token).await;
		assert_eq!(resp.tag, ResponseTag::Cancel);
	}
}
