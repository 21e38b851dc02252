//! Progress model & reporting (spec.md §4.6): rate-limited snapshots, the
//! long/short status phrasing matrix, and the rate/ETA math.

use std::{
	path::{Path, PathBuf},
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use unicode_segmentation::UnicodeSegmentation;

use crate::scan::OpKind;

/// Transfer counters tracked per-job, mirroring spec.md §3 `TransferInfo`.
#[derive(Debug, Clone)]
pub struct TransferInfo {
	pub num_files: u64,
	pub num_bytes: u64,
	pub op: OpKind,
	pub last_report_time: Instant,
	pub last_reported_files_left: u64,
	/// Set whenever the backend reports a byte count strictly between 0 and
	/// the file's total for a single file — i.e. progress is byte-granular
	/// for this transfer (spec.md §3).
	pub partial_progress: bool,
}

impl TransferInfo {
	#[must_use]
	pub fn new(op: OpKind) -> Self {
		Self {
			num_files: 0,
			num_bytes: 0,
			op,
			last_report_time: Instant::now(),
			last_reported_files_left: 0,
			partial_progress: false,
		}
	}
}

#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
	pub status_long: String,
	pub status_short: String,
	pub details: Option<String>,
	pub progress: f64,
	pub remaining_time_secs: Option<u64>,
	pub elapsed_secs: u64,
	pub is_paused: bool,
	pub is_cancelled: bool,
	pub destination: Option<PathBuf>,
}

pub type ProgressObserver = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Coalesces progress reports to at least 100ms apart, except the final
/// report (`files_left == 0`), which always fires (spec.md §4.6 "Rate
/// limiting").
const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// ETA/rate are only trustworthy once a transfer has been running this long
/// (spec.md §4.6 "Rate and ETA").
const SECONDS_NEEDED_FOR_RELIABLE_TRANSFER_RATE: u64 = 8;

/// Names are truncated (middle ellipsis) at this many grapheme clusters
/// (spec.md §4.6 "Phrasing matrix").
const DISPLAY_NAME_MAX_GRAPHEMES: usize = 50;

struct State {
	start: Instant,
	is_paused: bool,
	is_cancelled: bool,
	num_files_done: u64,
	num_bytes_done: u64,
	total_files: u64,
	total_bytes: u64,
	op: OpKind,
	partial_progress: bool,
	last_report: Option<Instant>,
	current_source: Option<PathBuf>,
	current_destination: Option<PathBuf>,
	/// Overrides the bytes/files-derived fraction below when set, for jobs
	/// whose progress isn't a simple counter ratio — the per-archive
	/// weighted math of spec.md §4.4 step 4 (`base_progress` + per-archive
	/// fraction).
	manual_fraction: Option<f64>,
}

/// Produces [`ProgressSnapshot`]s for UI consumers. One instance per job.
pub struct ProgressHandle {
	state: Mutex<State>,
	observer: Mutex<Option<ProgressObserver>>,
}

impl ProgressHandle {
	#[must_use]
	pub fn new(op: OpKind, total_files: u64, total_bytes: u64) -> Self {
		Self {
			state: Mutex::new(State {
				start: Instant::now(),
				is_paused: false,
				is_cancelled: false,
				num_files_done: 0,
				num_bytes_done: 0,
				total_files,
				total_bytes,
				op,
				partial_progress: false,
				last_report: None,
				current_source: None,
				current_destination: None,
				manual_fraction: None,
			}),
			observer: Mutex::new(None),
		}
	}

	pub fn set_observer(&self, observer: ProgressObserver) {
		*self.observer.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(observer);
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// Marks the job's timer paused and progress state "paused"; called
	/// while the job thread blocks on the conflict/error dialog (spec.md
	/// §4.9 "Pause semantics").
	pub fn set_paused(&self, paused: bool) {
		self.lock().is_paused = paused;
	}

	pub fn set_cancelled(&self) {
		self.lock().is_cancelled = true;
	}

	/// Advances counters by one file (`bytes` is that file's total size) and
	/// emits a rate-limited report.
	pub fn report_file_done(&self, path: &Path, destination: Option<&Path>, bytes: u64) {
		{
			let mut state = self.lock();
			state.num_files_done += 1;
			state.num_bytes_done += bytes;
			state.current_source = Some(path.to_path_buf());
			state.current_destination = destination.map(Path::to_path_buf);
		}
		self.maybe_report();
	}

	/// Reports intra-file byte progress (`done` of `total` for the file
	/// currently in flight), marking `partial_progress` per spec.md §3.
	pub fn report_bytes_in_flight(&self, path: &Path, done: u64, total: u64) {
		{
			let mut state = self.lock();
			if done > 0 && done < total {
				state.partial_progress = true;
			}
			state.current_source = Some(path.to_path_buf());
		}
		self.maybe_report();
	}

	/// Directly sets progress as a fraction in `[0, 1]`, overriding the
	/// bytes/files-derived fraction for jobs like extract whose work isn't a
	/// simple counter ratio (spec.md §4.4 step 4's per-archive weighting).
	/// `current` updates the "currently working on" path shown in phrasing,
	/// when known.
	pub fn set_fraction(&self, fraction: f64, current: Option<&Path>) {
		{
			let mut state = self.lock();
			state.manual_fraction = Some(fraction.clamp(0.0, 1.0));
			if let Some(path) = current {
				state.current_source = Some(path.to_path_buf());
			}
		}
		self.maybe_report();
	}

	/// Adjusts totals downward when a source is skipped late, per spec.md §4.1
	/// `source_info_remove_file_from_count`.
	pub fn retract(&self, files: u64, bytes: u64) {
		let mut state = self.lock();
        state.total_files = state.total_files.saturating_sub(files);
		state.total_bytes = state.total_bytes.saturating_sub(bytes);
	}

	fn maybe_report(&self) {
		let snapshot = {
			let mut state = self.lock();
			let files_left = state.total_files.saturating_sub(state.num_files_done);
			let is_final = files_left == 0;

			let due = state.last_report.map_or(true, |last| last.elapsed() >= MIN_REPORT_INTERVAL);
			if !due && !is_final {
				return;
			}
			state.last_report = Some(Instant::now());
			build_snapshot(&state)
		};

		if let Some(observer) = &*self.observer.lock().unwrap_or_else(std::sync::PoisonError::into_inner) {
			observer(&snapshot);
		}
	}

	/// Forces a snapshot regardless of rate limiting; used by `finalize` so
	/// the "done" state is always visible.
	#[must_use]
	pub fn snapshot(&self) -> ProgressSnapshot {
		build_snapshot(&self.lock())
	}
}

fn build_snapshot(state: &State) -> ProgressSnapshot {
	let elapsed = state.start.elapsed();
	let elapsed_secs = elapsed.as_secs();

	let progress = if let Some(fraction) = state.manual_fraction {
		fraction
	} else if state.total_bytes > 0 {
		state.num_bytes_done as f64 / state.total_bytes as f64
	} else if state.total_files > 0 {
		state.num_files_done as f64 / state.total_files as f64
	} else {
		0.0
	};

	let remaining_time_secs = remaining_time(state, elapsed_secs);

	let (status_long, status_short) = phrase(state);
	let details = detail_line(state, remaining_time_secs);

	ProgressSnapshot {
		status_long,
		status_short,
		details,
		progress: progress.clamp(0.0, 1.0),
		remaining_time_secs,
		elapsed_secs,
		is_paused: state.is_paused,
		is_cancelled: state.is_cancelled,
		destination: state.current_destination.clone(),
	}
}

fn remaining_time(state: &State, elapsed_secs: u64) -> Option<u64> {
	if elapsed_secs < SECONDS_NEEDED_FOR_RELIABLE_TRANSFER_RATE {
		return None;
	}

	if let Some(fraction) = state.manual_fraction {
		if fraction <= 0.0 {
			return None;
		}
		let rate = fraction / elapsed_secs as f64;
		if rate <= 0.0 {
			return None;
		}
		let remaining_fraction = (1.0 - fraction).max(0.0);
		let eta = (remaining_fraction / rate).round() as u64;
		return (eta > 0).then_some(eta);
	}

	if !state.partial_progress {
		// No byte-granular progress: the UI would stutter (spec.md §4.6).
		return None;
	}
	if state.num_bytes_done == 0 {
		return None;
	}

	let rate = state.num_bytes_done as f64 / elapsed_secs as f64;
	if rate <= 0.0 {
		return None;
	}

	let remaining_bytes = state.total_bytes.saturating_sub(state.num_bytes_done);
	let eta = (remaining_bytes as f64 / rate).round() as u64;
	(eta > 0).then_some(eta)
}

fn verb(op: OpKind) -> (&'static str, &'static str) {
	match op {
		OpKind::Copy => ("Copying", "Copying"),
		OpKind::Move => ("Moving", "Moving"),
		OpKind::Delete => ("Deleting", "Deleting"),
		OpKind::Trash => ("Trashing", "Trashing"),
		OpKind::ClearRecent => ("Clearing", "Clearing"),
		OpKind::Extract => ("Extracting", "Extracting"),
		OpKind::Compress => ("Compressing", "Compressing"),
		OpKind::Permissions => ("Changing permissions", "Permissions"),
	}
}

fn phrase(state: &State) -> (String, String) {
	let (long_verb, short_verb) = verb(state.op);

	let files_left = state.total_files.saturating_sub(state.num_files_done);
	let is_complete = match state.manual_fraction {
		Some(fraction) => fraction >= 1.0,
		None => files_left == 0 && state.total_files > 0,
	};
	if is_complete {
		return (format!("{long_verb} complete"), format!("{short_verb} complete"));
	}

	let status_short = if state.total_files <= 1 {
		short_verb.to_owned()
	} else {
		format!("{short_verb} {} files", state.total_files)
	};

	let status_long = match (&state.current_source, &state.current_destination) {
		(Some(src), Some(dst)) => format!(
			"{long_verb} \"{}\" to \"{}\"",
			truncate_display_name(&display_name(src)),
			truncate_display_name(&display_name(dst)),
		),
		(Some(src), None) => {
			format!("{long_verb} \"{}\"", truncate_display_name(&display_name(src)))
		}
		_ if state.total_files > 1 => format!("{long_verb} {} files", state.total_files),
		_ => long_verb.to_owned(),
	};

	(status_long, status_short)
}

fn detail_line(state: &State, remaining_time_secs: Option<u64>) -> Option<String> {
	if state.manual_fraction.is_none() && !state.partial_progress {
		return None;
	}
	let mut parts = Vec::new();
	if let Some(fraction) = state.manual_fraction {
		parts.push(format!("{}%", (fraction * 100.0).round() as u64));
	} else if state.total_bytes > 0 {
		let pct = ((state.num_bytes_done as f64 / state.total_bytes as f64) * 100.0).round() as u64;
		parts.push(format!("{pct}%"));
	}
	if let Some(secs) = remaining_time_secs {
		parts.push(format!("{} left", get_formatted_time(secs)));
	}
	(!parts.is_empty()).then(|| parts.join(", "))
}

/// Percent-escapes a path whose display name fails UTF-8 validation, per
/// spec.md §4.6 "Names that fail UTF-8 validation are percent-escaped."
fn display_name(path: &Path) -> String {
	match path.file_name().and_then(|n| n.to_str()) {
		Some(name) => name.to_owned(),
		None => {
			let lossy = path.file_name().map_or_else(
				|| path.to_string_lossy().into_owned(),
				|n| n.to_string_lossy().into_owned(),
			);
			percent_encoding::utf8_percent_encode(&lossy, percent_encoding::NON_ALPHANUMERIC)
				.to_string()
		}
	}
}

/// Middle-truncates `name` to `DISPLAY_NAME_MAX_GRAPHEMES` grapheme clusters
/// with an ellipsis, per spec.md §4.6.
#[must_use]
pub fn truncate_display_name(name: &str) -> String {
	let graphemes: Vec<&str> = name.graphemes(true).collect();
	if graphemes.len() <= DISPLAY_NAME_MAX_GRAPHEMES {
		return name.to_owned();
	}

	let keep = DISPLAY_NAME_MAX_GRAPHEMES.saturating_sub(1);
	let head = keep / 2;
	let tail = keep - head;
	let head_str: String = graphemes[..head].concat();
	let tail_str: String = graphemes[graphemes.len() - tail..].concat();
	format!("{head_str}\u{2026}{tail_str}")
}

/// `get_formatted_time` (spec.md §4.6.1, resolved breakpoints): `< 60s` →
/// "N seconds"; `< 3600s` → "N minutes"; `< 14400s` (4h) → "N hours"
/// (rounded); `>= 14400s` → "N hours, M minutes".
#[must_use]
pub fn get_formatted_time(secs: u64) -> String {
	if secs < 60 {
		return format!("{secs} second{}", plural(secs));
	}
	if secs < 3600 {
		let mins = secs / 60;
		return format!("{mins} minute{}", plural(mins));
	}
	if secs < 14400 {
		let hours = (secs as f64 / 3600.0).round() as u64;
		return format!("{hours} hour{}", plural(hours));
	}

	let hours = secs / 3600;
	let minutes = (secs % 3600) / 60;
	format!(
		"{hours} hour{}, {minutes} minute{}",
		plural(hours),
		plural(minutes)
	)
}

/// Parallel to [`get_formatted_time`]: the numeric value a translator would
/// key singular/plural selection off for the same string (spec.md §4.6.1).
#[must_use]
pub fn seconds_count_format_time_units(secs: u64) -> u64 {
	if secs < 60 {
		secs
	} else if secs < 3600 {
		secs / 60
	} else if secs < 14400 {
		(secs as f64 / 3600.0).round() as u64
	} else {
		secs / 3600
	}
}

fn plural(n: u64) -> &'static str {
	if n == 1 {
		""
	} else {
		"s"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn formats_seconds_minutes_hours_and_combined() {
		assert_eq!(get_formatted_time(5), "5 seconds");
		assert_eq!(get_formatted_time(1), "1 second");
		assert_eq!(get_formatted_time(90), "1 minute");
		assert_eq!(get_formatted_time(7200), "2 hours");
		assert_eq!(get_formatted_time(15000), "4 hours, 10 minutes");
	}

	#[test]
	fn seconds_count_matches_the_chosen_template_unit() {
		assert_eq!(seconds_count_format_time_units(5), 5);
		assert_eq!(seconds_count_format_time_units(90), 1);
		assert_eq!(seconds_count_format_time_units(15000), 4);
	}

	#[test]
	fn truncates_long_names_in_the_middle() {
		let long_name = "a".repeat(80);
		let truncated = truncate_display_name(&long_name);
		assert_eq!(truncated.graphemes(true).count(), 50);
		assert!(truncated.contains('\u{2026}'));
	}

	#[test]
	fn short_names_are_untouched() {
		assert_eq!(truncate_display_name("short.txt"), "short.txt");
	}

	#[test]
	fn eta_is_none_without_partial_progress() {
		let handle = ProgressHandle::new(OpKind::Copy, 10, 1_000_000);
		let snap = handle.snapshot();
		assert!(snap.remaining_time_secs.is_none());
	}

	#[test]
	fn set_fraction_overrides_the_counter_derived_progress() {
		let handle = ProgressHandle::new(OpKind::Extract, 0, 0);
		assert_eq!(handle.snapshot().progress, 0.0);

		handle.set_fraction(0.5, None);
		assert_eq!(handle.snapshot().progress, 0.5);

		handle.set_fraction(1.0, None);
		let snap = handle.snapshot();
		assert_eq!(snap.progress, 1.0);
		assert_eq!(snap.status_long, "Extracting complete");
	}

	#[test]
	fn final_report_always_fires_even_under_rate_limit() {
		let handle = ProgressHandle::new(OpKind::Copy, 1, 10);
		let reports = Arc::new(Mutex::new(0));
		let reports_clone = Arc::clone(&reports);
		handle.set_observer(Arc::new(move |_| {
			*reports_clone.lock().unwrap() += 1;
		}));
		handle.report_file_done(Path::new("/a/x"), None, 10);
		assert_eq!(*reports.lock().unwrap(), 1);
	}
}
