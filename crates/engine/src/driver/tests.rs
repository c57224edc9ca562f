use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sibyl_primitives::{Completion, Selection};

use super::*;
use crate::provider::{MetaCompletion, Provider};
use crate::registry::ProviderFlags;

#[derive(Default)]
struct TextAnalyzer {
	analyzed: Arc<Mutex<Vec<String>>>,
}

impl Analyzer for TextAnalyzer {
	type Global = ();
	type Inputs = String;

	fn analyze(&self, _ctx: &WorkContext, _global: &(), buffer: &SelectedBuffer) -> std::result::Result<String, ProviderError> {
		self.analyzed.lock().push(buffer.to_string());
		std::thread::sleep(Duration::from_millis(5));
		Ok(buffer.text().to_owned())
	}
}

type Produce = dyn Fn(&WorkContext, &SelectedBuffer) -> std::result::Result<Option<Vec<MetaCompletion>>, ProviderError> + Send + Sync;

struct FnProvider {
	name: &'static str,
	produce: Box<Produce>,
}

impl FnProvider {
	fn new(
		name: &'static str,
		produce: impl Fn(&WorkContext, &SelectedBuffer) -> std::result::Result<Option<Vec<MetaCompletion>>, ProviderError> + Send + Sync + 'static,
	) -> Self {
		Self {
			name,
			produce: Box::new(produce),
		}
	}
}

impl Provider<TextAnalyzer> for FnProvider {
	fn name(&self) -> ProviderName {
		self.name.into()
	}

	fn provide(
		&self,
		ctx: &WorkContext,
		_global: &(),
		buffer: &SelectedBuffer,
		inputs: &String,
		emit: &mut dyn FnMut(MetaCompletion),
	) -> std::result::Result<Applicability, ProviderError> {
		assert_eq!(inputs, buffer.text());
		match (self.produce)(ctx, buffer)? {
			Some(metas) => {
				for meta in metas {
					emit(meta);
				}
				Ok(Applicability::Applicable)
			}
			None => Ok(Applicability::NotApplicable),
		}
	}
}

const BLOCKING: ProviderFlags = ProviderFlags::BLOCKING.union(ProviderFlags::SPECULATE).union(ProviderFlags::COMPOSE);

fn json_attrs() -> FnProvider {
	FnProvider::new("attrs", |_, buffer| {
		if !buffer.text().ends_with("json.d") {
			return Ok(Some(Vec::new()));
		}
		let replace = Selection::new(5, 6);
		Ok(Some(vec![
			MetaCompletion::new(Completion::text(replace, "dumps"), 0.9),
			MetaCompletion::new(Completion::text(replace, "dump"), 1.0),
		]))
	})
}

/// Runs until its context is cancelled, recording that it started.
fn stubborn(name: &'static str, started: Arc<AtomicBool>) -> FnProvider {
	FnProvider::new(name, move |ctx, _| {
		started.store(true, Ordering::SeqCst);
		while !ctx.is_cancelled() {
			std::thread::sleep(Duration::from_millis(5));
		}
		Err(ProviderError::Expired)
	})
}

fn start(registry: ProviderRegistry<TextAnalyzer>) -> Driver<TextAnalyzer> {
	Driver::new(TextAnalyzer::default(), registry, DriverConfig::default()).unwrap()
}

fn sb(text: &str) -> SelectedBuffer {
	SelectedBuffer::with_cursor_marker(text, "‸")
}

fn eventually(mut check: impl FnMut() -> bool) -> bool {
	let deadline = Instant::now() + Duration::from_secs(5);
	while Instant::now() < deadline {
		if check() {
			return true;
		}
		std::thread::sleep(Duration::from_millis(5));
	}
	false
}

fn displays(out: &[RenderedCompletion]) -> Vec<&str> {
	out.iter().map(|c| c.display.as_str()).collect()
}

#[test]
fn blocking_update_mixes_blocking_providers() {
	let driver = start(ProviderRegistry::new().with(json_attrs(), BLOCKING));
	let mut reports = Vec::new();
	let out = driver
		.update_with_metrics(&WorkContext::new(), &Options::default(), (), sb("json.d‸"), true, |m| {
			reports.push(m.clone())
		})
		.unwrap();

	assert_eq!(displays(&out), ["dump", "dumps"]);
	assert!(out.iter().all(|c| c.replace == Selection::new(5, 6)));
	assert_eq!(reports.len(), 1);
	assert_eq!(reports[0].accepted, [ProviderName::from("attrs")]);
	assert_eq!(reports[0].fulfilling, [ProviderName::from("attrs")]);
	assert!(reports[0].timed_out.is_empty());
}

#[test]
fn non_blocking_update_speculates_in_background() {
	let driver = start(ProviderRegistry::new().with(json_attrs(), BLOCKING));
	let out = driver
		.update(&WorkContext::new(), &Options::default(), (), sb("json.d‸"), false)
		.unwrap();
	assert!(out.is_empty());

	assert!(eventually(|| {
		driver
			.scheduler_fixture()
			.cache
			.iter()
			.any(|e| e.source == sb("json.d‸") && e.completions.len() == 2)
	}));

	// Results computed in the background are served without rerunning.
	let out = driver
		.update(&WorkContext::new(), &Options::default(), (), sb("json.d‸"), true)
		.unwrap();
	assert_eq!(displays(&out), ["dump", "dumps"]);
}

#[test]
fn stopped_driver_rejects_updates() {
	let driver = start(ProviderRegistry::new().with(json_attrs(), BLOCKING));
	driver.cleanup();
	let err = driver
		.update(&WorkContext::new(), &Options::default(), (), sb("x‸"), true)
		.unwrap_err();
	assert!(matches!(err, EngineError::Stopped));
}

#[test]
fn cancelled_request_fails_fast() {
	let driver = start(ProviderRegistry::new().with(json_attrs(), BLOCKING));
	let ctx = WorkContext::new();
	ctx.cancel();
	let err = driver.update(&ctx, &Options::default(), (), sb("x‸"), true).unwrap_err();
	assert!(matches!(err, EngineError::Cancelled));
}

#[test]
fn provider_panics_are_contained() {
	let registry = ProviderRegistry::new()
		.with(FnProvider::new("boom", |_, _| panic!("provider bug")), ProviderFlags::BLOCKING)
		.with(
			FnProvider::new("ok", |_, b| Ok(Some(vec![MetaCompletion::new(Completion::text(b.selection, "okay"), 1.0)]))),
			ProviderFlags::BLOCKING,
		);
	let driver = start(registry);
	let mut fulfilling = Vec::new();
	let out = driver
		.update_with_metrics(&WorkContext::new(), &Options::default(), (), sb("‸"), true, |m| {
			fulfilling = m.fulfilling.clone()
		})
		.unwrap();
	assert_eq!(displays(&out), ["okay"]);
	assert_eq!(fulfilling, [ProviderName::from("ok")]);
}

#[test]
fn not_applicable_providers_are_not_accepted() {
	let registry = ProviderRegistry::new()
		.with(FnProvider::new("never", |_, _| Ok(None)), BLOCKING)
		.with(json_attrs(), BLOCKING);
	let driver = start(registry);
	let mut accepted = Vec::new();
	driver
		.update_with_metrics(&WorkContext::new(), &Options::default(), (), sb("json.d‸"), true, |m| {
			accepted = m.accepted.clone()
		})
		.unwrap();
	assert_eq!(accepted, [ProviderName::from("attrs")]);
}

#[test]
fn failed_and_timed_out_providers_are_accepted() {
	let started = Arc::new(AtomicBool::new(false));
	let registry = ProviderRegistry::new()
		.with(stubborn("slow", Arc::clone(&started)), ProviderFlags::BLOCKING)
		.with(
			FnProvider::new("fails", |_, _| Err(ProviderError::Failed("broken".into()))),
			ProviderFlags::BLOCKING,
		)
		.with(FnProvider::new("never", |_, _| Ok(None)), ProviderFlags::BLOCKING)
		.with(json_attrs(), ProviderFlags::BLOCKING);
	let driver = start(registry);
	let opts = Options {
		block_timeout_ms: Some(100),
		..Default::default()
	};

	let mut report = UpdateMetrics::default();
	let out = driver
		.update_with_metrics(&WorkContext::new(), &opts, (), sb("json.d‸"), true, |m| report = m.clone())
		.unwrap();
	assert_eq!(displays(&out), ["dump", "dumps"]);
	let mut accepted = report.accepted.clone();
	accepted.sort();
	assert_eq!(accepted, [ProviderName::from("attrs"), "fails".into(), "slow".into()]);
	assert_eq!(report.timed_out, [ProviderName::from("slow")]);
}

#[test]
fn block_debug_ignores_block_timeout() {
	let registry = ProviderRegistry::new().with(
		FnProvider::new("late", |_, b| {
			std::thread::sleep(Duration::from_millis(100));
			Ok(Some(vec![MetaCompletion::new(Completion::text(b.selection, "later"), 1.0)]))
		}),
		ProviderFlags::BLOCKING,
	);
	let driver = start(registry);
	let opts = Options {
		block_debug: true,
		block_timeout_ms: Some(10),
		..Default::default()
	};

	let mut timed_out = vec![ProviderName::from("unset")];
	let out = driver
		.update_with_metrics(&WorkContext::new(), &opts, (), sb("‸"), true, |m| timed_out = m.timed_out.clone())
		.unwrap();
	assert!(timed_out.is_empty());
	assert_eq!(displays(&out), ["later"]);
}

#[test]
fn unstarted_blocking_work_is_released() {
	let driver = start(ProviderRegistry::new().with(json_attrs(), ProviderFlags::BLOCKING));
	let item = WorkItem::new(sb("json.d‸"), "attrs".into());

	let mut state = driver.shared.state.lock();
	state.global = Some(Arc::new(()));
	let old = state.sched.root().cloned();
	state.sched.update(Default::default(), old.as_ref(), &item.buffer);
	assert_eq!(state.sched.work_status(&item), WorkStatus::Pending);
	let job = driver.shared.claim(&mut state, item.clone()).unwrap();
	assert_eq!(state.sched.status(&item.key()), Some(WorkStatus::InProgress));

	driver
		.shared
		.abandon(&mut state, &job.item, &job.latch, std::io::Error::other("no threads"));
	assert_eq!(state.sched.status(&item.key()), Some(WorkStatus::Pending));
	assert!(state.done.is_empty());
	assert!(matches!(job.latch.get(), Some(Err(ProviderError::Failed(_)))));
}

#[test]
fn block_timeout_abandons_slow_providers() {
	let started = Arc::new(AtomicBool::new(false));
	let registry = ProviderRegistry::new()
		.with(stubborn("slow", Arc::clone(&started)), BLOCKING)
		.with(json_attrs(), BLOCKING);
	let driver = start(registry);
	let opts = Options {
		block_timeout_ms: Some(300),
		..Default::default()
	};

	let begin = Instant::now();
	let mut timed_out = Vec::new();
	let out = driver
		.update_with_metrics(&WorkContext::new(), &opts, (), sb("json.d‸"), true, |m| timed_out = m.timed_out.clone())
		.unwrap();
	assert!(begin.elapsed() < Duration::from_secs(2));
	assert_eq!(displays(&out), ["dump", "dumps"]);
	assert_eq!(timed_out, [ProviderName::from("slow")]);
	assert!(started.load(Ordering::SeqCst));
}

#[test]
fn inputs_are_shared_between_providers() {
	let analyzer = TextAnalyzer::default();
	let analyzed = Arc::clone(&analyzer.analyzed);
	let registry = ProviderRegistry::new()
		.with(FnProvider::new("a", |_, _| Ok(Some(Vec::new()))), BLOCKING)
		.with(FnProvider::new("b", |_, _| Ok(Some(Vec::new()))), BLOCKING);
	let driver = Driver::new(analyzer, registry, DriverConfig::default()).unwrap();
	driver
		.update(&WorkContext::new(), &Options::default(), (), sb("abc‸"), true)
		.unwrap();
	let root_runs = analyzed.lock().iter().filter(|s| s.as_str() == "abc‸").count();
	assert_eq!(root_runs, 1);
}

#[test]
fn update_cancels_orphaned_work() {
	let started = Arc::new(AtomicBool::new(false));
	let registry = ProviderRegistry::new().with(stubborn("slow", Arc::clone(&started)), ProviderFlags::SPECULATE);
	let driver = start(registry);

	driver
		.update(&WorkContext::new(), &Options::default(), (), sb("a‸"), false)
		.unwrap();
	assert!(eventually(|| started.load(Ordering::SeqCst)));

	driver
		.update(&WorkContext::new(), &Options::default(), (), sb("zzz‸"), false)
		.unwrap();
	let old = WorkKey {
		state: sb("a‸").hash(),
		provider: "slow".into(),
	};
	assert!(eventually(|| {
		let state = driver.shared.state.lock();
		state.sched.status(&old) == Some(WorkStatus::Pending) && !state.done.contains_key(&old)
	}));
}

#[test]
fn reset_waits_for_in_flight_work() {
	let started = Arc::new(AtomicBool::new(false));
	let registry = ProviderRegistry::new().with(stubborn("slow", Arc::clone(&started)), ProviderFlags::SPECULATE);
	let driver = start(registry);

	driver
		.update(&WorkContext::new(), &Options::default(), (), sb("a‸"), false)
		.unwrap();
	assert!(eventually(|| started.load(Ordering::SeqCst)));

	driver.reset();
	assert!(driver.shared.state.lock().done.is_empty());
	assert!(matches!(
		driver.update(&WorkContext::new(), &Options::default(), (), sb("b‸"), false),
		Err(EngineError::Stopped)
	));
}

#[test]
fn block_debug_waits_for_speculation() {
	let registry = ProviderRegistry::new().with(json_attrs(), ProviderFlags::SPECULATE);
	let driver = start(registry);
	let opts = Options {
		block_debug: true,
		..Default::default()
	};
	driver.update(&WorkContext::new(), &opts, (), sb("json.d‸"), false).unwrap();

	let fixture = driver.scheduler_fixture();
	assert!(fixture.cache.iter().any(|e| e.source == sb("json.d‸")));
	let state = driver.shared.state.lock();
	assert!(!state.sched.has_work());
	assert!(state.done.is_empty());
}

#[test]
fn fixtures_round_trip_through_driver() {
	let driver = start(ProviderRegistry::new().with(json_attrs(), BLOCKING));
	driver
		.update(&WorkContext::new(), &Options::default(), (), sb("json.d‸"), true)
		.unwrap();
	let fixture = driver.scheduler_fixture();

	let replay = start(ProviderRegistry::new().with(FnProvider::new("attrs", |_, _| Ok(Some(Vec::new()))), BLOCKING));
	replay.load_fixture(fixture.clone()).unwrap();
	assert_eq!(replay.scheduler_fixture(), fixture);
}
