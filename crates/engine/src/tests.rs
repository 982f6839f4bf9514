use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use taglight_buffer::{Buffer, LineStore};
use taglight_msgpack::{HandleKind, Value};
use taglight_project::{Compression, ProjectCache};
use taglight_rpc::{AtomicBatch, RemoteError};

use crate::{
	Analyzer, Analyzers, Config, Decoration, Dispatcher, Event, EventError, ExternalUpdate, Host, KeywordSet, Result,
	Session, Shutdown, Workers,
};

struct MockBuffer {
	name: String,
	filetype: String,
	tick: u64,
	lines: Vec<Vec<u8>>,
}

#[derive(Default)]
struct MockState {
	current: i64,
	buffers: HashMap<i64, MockBuffer>,
	attached: Vec<i64>,
	detached: Vec<i64>,
	batches: Vec<AtomicBatch>,
	errors: Vec<String>,
	namespaces: usize,
	refuse_attach: bool,
}

/// A scripted host editor recording the calls made to it.
#[derive(Default)]
struct MockHost {
	state: Mutex<MockState>,
}

impl MockHost {
	fn add_buffer(&self, id: i64, name: &str, filetype: &str, text: &[&str]) {
		self.state.lock().buffers.insert(
			id,
			MockBuffer {
				name: name.into(),
				filetype: filetype.into(),
				tick: 2,
				lines: lines(text),
			},
		);
	}

	fn set_current(&self, id: i64) {
		self.state.lock().current = id;
	}

	fn set_filetype(&self, id: i64, filetype: &str) {
		if let Some(b) = self.state.lock().buffers.get_mut(&id) {
			b.filetype = filetype.into();
		}
	}

	fn attached(&self) -> Vec<i64> {
		self.state.lock().attached.clone()
	}

	fn detached(&self) -> Vec<i64> {
		self.state.lock().detached.clone()
	}

	fn batches(&self) -> Vec<AtomicBatch> {
		self.state.lock().batches.clone()
	}

	fn lookup<R>(&self, buf: i64, f: impl FnOnce(&MockBuffer) -> R) -> Result<R> {
		let state = self.state.lock();
		state.buffers.get(&buf).map(f).ok_or_else(|| {
			taglight_rpc::Error::Remote(RemoteError {
				kind: Some(0),
				message: "Invalid buffer id".into(),
			})
			.into()
		})
	}
}

impl Host for MockHost {
	fn current_buffer(&self) -> Result<i64> {
		Ok(self.state.lock().current)
	}

	fn filetype(&self, buf: i64) -> Result<String> {
		self.lookup(buf, |b| b.filetype.clone())
	}

	fn buffer_name(&self, buf: i64) -> Result<String> {
		self.lookup(buf, |b| b.name.clone())
	}

	fn changedtick(&self, buf: i64) -> Result<u64> {
		self.lookup(buf, |b| b.tick)
	}

	fn buffer_lines(&self, buf: i64) -> Result<Vec<Vec<u8>>> {
		self.lookup(buf, |b| b.lines.clone())
	}

	fn attach(&self, buf: i64) -> Result<bool> {
		let mut state = self.state.lock();
		if state.refuse_attach {
			return Ok(false);
		}
		state.attached.push(buf);
		Ok(true)
	}

	fn detach(&self, buf: i64) -> Result<bool> {
		self.state.lock().detached.push(buf);
		Ok(true)
	}

	fn create_namespace(&self, _name: &str) -> Result<i64> {
		let mut state = self.state.lock();
		state.namespaces += 1;
		Ok(7)
	}

	fn apply_batch(&self, batch: AtomicBatch) -> Result<()> {
		self.state.lock().batches.push(batch);
		Ok(())
	}

	fn report_error(&self, msg: &str) {
		self.state.lock().errors.push(msg.to_owned());
	}
}

fn lines(text: &[&str]) -> Vec<Vec<u8>> {
	text.iter().map(|s| s.as_bytes().to_vec()).collect()
}

fn config(cache_dir: &Path) -> Config {
	Config {
		cache_dir: cache_dir.to_owned(),
		compression: Compression::None,
		norecurse_dirs: vec![PathBuf::from("/")],
		keywords: vec![KeywordSet {
			filetypes: vec!["c".into(), "cpp".into()],
			group: "Todo".into(),
			words: vec!["TODO".into(), "FIXME".into()],
		}],
		..Config::default()
	}
}

struct Fixture {
	host: Arc<MockHost>,
	session: Arc<Session>,
	dispatcher: Dispatcher,
	_dir: tempfile::TempDir,
}

fn fixture_with(analyzers: impl FnOnce(&Config) -> Analyzers) -> Fixture {
	let dir = tempfile::tempdir().unwrap();
	let config = config(dir.path());
	let analyzers = analyzers(&config);
	let host = Arc::new(MockHost::default());
	let session = Session::new(Arc::clone(&host) as Arc<dyn Host>, config, analyzers, Workers::Inline).unwrap();
	let dispatcher = Dispatcher::new(Arc::clone(&session));
	Fixture {
		host,
		session,
		dispatcher,
		_dir: dir,
	}
}

fn fixture() -> Fixture {
	fixture_with(|c| Analyzers::from_keywords(&c.keywords))
}

fn update(code: u64) -> (&'static str, Vec<Value>) {
	("vim_event_update", vec![Value::UInt(code)])
}

fn lines_event(buf: i64, tick: u64, first: i64, last: i64, text: &[&str]) -> Vec<Value> {
	vec![
		Value::handle(HandleKind::Buffer, buf),
		Value::UInt(tick),
		Value::Int(first),
		Value::Int(last),
		Value::Array(text.iter().map(|s| Value::from(*s)).collect()),
		Value::Bool(false),
	]
}

/// `(line, start, end, group)` of every highlight in a batch.
fn highlights(batch: &AtomicBatch) -> Vec<(u64, u64, i64, String)> {
	let Value::Array(calls) = batch.clone().into_value() else {
		panic!("batch is not an array");
	};
	calls
		.into_iter()
		.filter_map(|call| {
			let call = call.into_array()?;
			if call[0].as_str() != Some("nvim_buf_add_highlight") {
				return None;
			}
			let args = call[1].as_array()?;
			Some((
				args[3].as_u64()?,
				args[4].as_u64()?,
				args[5].as_i64()?,
				args[2].as_str()?.to_owned(),
			))
		})
		.collect()
}

impl Fixture {
	fn send(&self, (method, params): (&str, Vec<Value>)) {
		self.dispatcher.dispatch(method, params);
	}

	fn open(&self, id: i64, name: &str, filetype: &str, text: &[&str]) {
		self.host.add_buffer(id, name, filetype, text);
		self.host.set_current(id);
		self.send(update(0));
	}
}

#[test]
fn new_buffer_is_attached_and_highlighted() {
	let f = fixture();
	f.open(1, "/src/proj/main.c", "c", &["int x; // TODO", "FIXME: y"]);

	let buffer = f.session.buffers().get(1).expect("attached");
	assert_eq!(buffer.snapshot(), lines(&["int x; // TODO", "FIXME: y"]));
	assert_eq!(buffer.changetick(), 2);
	assert_eq!(f.host.attached(), [1]);

	let batches = f.host.batches();
	assert_eq!(batches.len(), 1);
	let methods: Vec<_> = batches[0].methods().collect();
	assert_eq!(methods[0], "nvim_buf_clear_namespace");
	assert_eq!(
		highlights(&batches[0]),
		[(0, 10, 14, "Todo".to_owned()), (1, 0, 5, "Todo".to_owned())]
	);
	assert!(!buffer.needs_highlight());
}

#[test]
fn ignored_and_unanalyzed_filetypes_are_skipped() {
	let f = fixture();
	f.open(1, "/src/proj/README", "", &["x"]);
	f.open(2, "/src/proj/notes.md", "markdown", &["TODO"]);
	f.host.add_buffer(3, "", "c", &["TODO"]);
	f.host.set_current(3);
	f.send(update(0));

	assert!(f.session.buffers().is_empty());
	assert!(f.host.attached().is_empty());
}

#[test]
fn refused_attach_releases_everything() {
	let f = fixture();
	f.host.state.lock().refuse_attach = true;
	f.open(1, "/src/proj/main.c", "c", &["x"]);
	assert!(f.session.buffers().is_empty());
	assert!(f.session.caches().is_empty());
}

#[test]
fn line_events_update_the_mirror_and_rehighlight() {
	let f = fixture();
	f.open(1, "/src/proj/main.c", "c", &["a", "b"]);

	f.send(("nvim_buf_lines_event", lines_event(1, 3, 1, 2, &["TODO", "c"])));
	let buffer = f.session.buffers().get(1).unwrap();
	assert_eq!(buffer.snapshot(), lines(&["a", "TODO", "c"]));
	assert_eq!(buffer.changetick(), 3);

	let batches = f.host.batches();
	assert_eq!(batches.len(), 2);
	assert_eq!(highlights(&batches[1]), [(1, 0, 4, "Todo".to_owned())]);
}

#[test]
fn initial_full_update_replaces_loaded_lines() {
	let f = fixture();
	f.open(1, "/src/proj/main.c", "c", &["stale"]);
	f.send(("nvim_buf_lines_event", lines_event(1, 2, 0, -1, &["fresh", "text"])));
	assert_eq!(f.session.buffers().get(1).unwrap().snapshot(), lines(&["fresh", "text"]));
}

#[test]
fn partial_changes_wait_for_the_last_event() {
	let f = fixture();
	f.open(1, "/src/proj/main.c", "c", &["a"]);
	let mut first = lines_event(1, 3, 0, 0, &["TODO"]);
	first[5] = Value::Bool(true);
	f.send(("nvim_buf_lines_event", first));
	assert_eq!(f.host.batches().len(), 1);

	f.send(("nvim_buf_lines_event", lines_event(1, 4, 2, 2, &["z"])));
	assert_eq!(f.host.batches().len(), 2);
	assert_eq!(f.session.buffers().get(1).unwrap().snapshot(), lines(&["TODO", "a", "z"]));
}

#[test]
fn edit_without_changedtick_rehighlights() {
	let f = fixture();
	f.open(1, "/src/proj/main.c", "c", &["a"]);
	let mut event = lines_event(1, 0, 0, 1, &["TODO"]);
	event[1] = Value::Nil;
	f.send(("nvim_buf_lines_event", event));

	let buffer = f.session.buffers().get(1).unwrap();
	assert_eq!(buffer.snapshot(), lines(&["TODO"]));
	assert_eq!(buffer.changetick(), 2);
	let batches = f.host.batches();
	assert_eq!(batches.len(), 2);
	assert_eq!(highlights(&batches[1]), [(0, 0, 4, "Todo".to_owned())]);
	assert!(!buffer.needs_highlight());
}

#[test]
fn changedtick_event_without_text_change() {
	let f = fixture();
	f.open(1, "/src/proj/main.c", "c", &["a"]);
	f.send(("nvim_buf_changedtick_event", vec![Value::Int(1), Value::UInt(9)]));
	assert_eq!(f.session.buffers().get(1).unwrap().changetick(), 9);
	f.send(("nvim_buf_changedtick_event", vec![Value::Int(5), Value::UInt(9)]));
}

#[test]
fn detach_of_unknown_buffer_is_a_no_op() {
	let f = fixture();
	f.send(("nvim_buf_detach_event", vec![Value::Int(42)]));
	assert!(!f.session.detach(42));
	assert!(f.session.buffers().is_empty());
}

#[test]
fn detach_closes_buffer_and_releases_cache() {
	let f = fixture();
	f.open(1, "/src/proj/main.c", "c", &["a"]);
	let buffer = f.session.buffers().get(1).unwrap();

	f.send(("nvim_buf_detach_event", vec![Value::handle(HandleKind::Buffer, 1)]));
	assert!(f.session.buffers().get(1).is_none());
	assert!(buffer.is_closed());
	assert!(f.session.caches().is_empty());

	// Events racing the detach are dropped.
	f.send(("nvim_buf_lines_event", lines_event(1, 3, 0, 1, &["x"])));
	assert_eq!(buffer.snapshot(), lines(&["a"]));
}

#[test]
fn buffers_of_one_project_share_a_cache() {
	let f = fixture();
	f.open(1, "/src/proj/a.c", "c", &["a"]);
	f.open(2, "/src/proj/b.c", "c", &["b"]);
	f.open(3, "/src/other/c.c", "c", &["c"]);

	let caches = f.session.caches();
	assert_eq!(caches.ref_count(Path::new("/src/proj"), "c"), Some(2));
	assert_eq!(caches.ref_count(Path::new("/src/other"), "c"), Some(1));

	f.session.detach(1);
	assert_eq!(caches.ref_count(Path::new("/src/proj"), "c"), Some(1));
	f.session.detach(2);
	assert_eq!(caches.ref_count(Path::new("/src/proj"), "c"), None);
}

#[test]
fn buffer_changed_reattaches_after_detach() {
	let f = fixture();
	f.open(1, "/src/proj/main.c", "c", &["a"]);
	f.session.detach(1);
	assert!(f.session.buffers().have_seen(1));

	f.send(update(1));
	assert!(f.session.buffers().get(1).is_some());
	assert_eq!(f.host.attached(), [1, 1]);

	// Same current buffer again: nothing to do.
	f.send(update(1));
	assert_eq!(f.host.attached(), [1, 1]);
}

#[test]
fn filetype_change_reattaches() {
	let f = fixture();
	f.open(1, "/src/proj/main.h", "c", &["a"]);
	let old = f.session.buffers().get(1).unwrap();

	f.host.set_filetype(1, "cpp");
	f.send(update(2));

	assert!(old.is_closed());
	let new = f.session.buffers().get(1).unwrap();
	assert_eq!(new.filetype(), "cpp");
	assert_eq!(f.host.detached(), [1]);
	assert_eq!(f.session.caches().ref_count(Path::new("/src/proj"), "c"), None);
	assert_eq!(f.session.caches().ref_count(Path::new("/src/proj"), "cpp"), Some(1));
}

#[test]
fn clear_and_force_update() {
	let f = fixture();
	f.open(1, "/src/proj/main.c", "c", &["TODO"]);

	f.send(update(5));
	let batches = f.host.batches();
	assert_eq!(batches.len(), 2);
	assert!(highlights(&batches[1]).is_empty());

	f.send(update(4));
	let batches = f.host.batches();
	assert_eq!(batches.len(), 3);
	assert_eq!(highlights(&batches[2]).len(), 1);
	assert_eq!(f.host.state.lock().namespaces, 1);
}

#[derive(Default)]
struct RecordingAnalyzer {
	updates: AtomicUsize,
}

impl Analyzer for RecordingAnalyzer {
	fn name(&self) -> &str {
		"recording"
	}

	fn decorate(&self, buffer: &Buffer, lines: &LineStore) -> Result<Vec<Decoration>> {
		// Re-entering the line lock from inside an analyzer is allowed.
		let again = buffer.line_count();
		assert_eq!(again, lines.len());
		Ok(vec![Decoration {
			line: 0,
			start: 0,
			end: -1,
			group: "Special".into(),
		}])
	}

	fn update_project(&self, cache: &ProjectCache) -> Result<()> {
		self.updates.fetch_add(1, Ordering::SeqCst);
		cache.write_scratch(b"tags for the project")?;
		Ok(())
	}
}

#[test]
fn update_tags_refreshes_the_project_archive() {
	let analyzer = Arc::new(RecordingAnalyzer::default());
	let registered = Arc::clone(&analyzer);
	let f = fixture_with(move |_| {
		let mut analyzers = Analyzers::new();
		analyzers.register(["c"], registered);
		analyzers
	});
	f.open(1, "/src/proj/main.c", "c", &["a", "b"]);

	f.send(update(3));
	assert_eq!(analyzer.updates.load(Ordering::SeqCst), 1);
	let archive = f.session.buffers().get(1).unwrap().with_cache(|c| c.archive_path().to_owned()).unwrap();
	assert_eq!(std::fs::read(&archive).unwrap(), b"tags for the project");
	assert_eq!(highlights(&f.host.batches()[1]), [(0, 0, -1, "Special".to_owned())]);
}

#[test]
fn archive_is_restored_for_a_new_project_cache() {
	let f = fixture();
	f.open(1, "/src/proj/main.c", "c", &["a"]);
	f.session.buffers().get(1).unwrap().with_cache(|c| {
		c.write_scratch(b"saved").unwrap();
		c.save_archive().unwrap();
	});
	f.session.detach(1);

	f.open(2, "/src/proj/util.c", "c", &["b"]);
	let restored = f.session.buffers().get(2).unwrap().with_cache(|c| c.read_scratch().unwrap());
	assert_eq!(restored.as_deref(), Some(b"saved".as_slice()));
}

#[test]
fn stop_detaches_everything_and_signals_shutdown() {
	let f = fixture();
	f.open(1, "/src/proj/a.c", "c", &["a"]);
	f.open(2, "/src/proj/b.c", "c", &["b"]);
	assert_eq!(f.session.shutdown_reason(), None);

	f.send(update(6));
	assert!(f.session.buffers().is_empty());
	let mut detached = f.host.detached();
	detached.sort_unstable();
	assert_eq!(detached, [1, 2]);
	assert_eq!(f.session.wait_for_shutdown(), Shutdown::Stop);

	// The first reason sticks.
	f.send(update(7));
	assert_eq!(f.session.shutdown_reason(), Some(Shutdown::Stop));
}

#[test]
fn shutdown_wakes_a_waiting_thread() {
	let f = fixture();
	assert_eq!(f.session.wait_for_shutdown_timeout(Duration::from_millis(10)), None);

	let session = Arc::clone(&f.session);
	let waiter = std::thread::spawn(move || session.wait_for_shutdown());
	f.send(update(7));
	assert_eq!(waiter.join().unwrap(), Shutdown::Exit);
}

#[test]
fn failed_update_is_reported_to_the_host() {
	let f = fixture();
	f.host.set_current(99);
	f.send(update(0));
	let errors = f.host.state.lock().errors.clone();
	assert_eq!(errors.len(), 1);
	assert!(errors[0].contains("Invalid buffer id"), "{errors:?}");
}

#[test]
fn threaded_workers_highlight_in_the_background() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(dir.path());
	let analyzers = Analyzers::from_keywords(&config.keywords);
	let host = Arc::new(MockHost::default());
	let session = Session::new(Arc::clone(&host) as Arc<dyn Host>, config, analyzers, Workers::Threaded).unwrap();
	let dispatcher = Dispatcher::new(Arc::clone(&session));

	host.add_buffer(1, "/src/proj/main.c", "c", &["TODO"]);
	host.set_current(1);
	let (method, params) = update(0);
	dispatcher.dispatch(method, params);

	let deadline = std::time::Instant::now() + Duration::from_secs(5);
	while host.batches().is_empty() {
		assert!(std::time::Instant::now() < deadline, "no highlight batch arrived");
		std::thread::sleep(Duration::from_millis(5));
	}
	assert_eq!(highlights(&host.batches()[0]), [(0, 0, 4, "Todo".to_owned())]);
}

#[test]
fn event_parsing() {
	let lines = Event::parse("nvim_buf_lines_event", lines_event(3, 5, 0, -1, &["x"])).unwrap();
	assert_eq!(
		lines,
		Event::Lines {
			buffer: 3,
			tick: Some(5),
			first: 0,
			last: -1,
			lines: vec![b"x".to_vec()],
			more: false,
		}
	);
	assert_eq!(lines.buffer(), Some(3));

	let mut untick = lines_event(3, 5, 0, 1, &[]);
	untick[1] = Value::Nil;
	assert!(matches!(
		Event::parse("nvim_buf_lines_event", untick),
		Ok(Event::Lines { tick: None, .. })
	));

	assert_eq!(
		Event::parse("vim_event_update", vec![Value::UInt(2)]),
		Ok(Event::External(ExternalUpdate::SyntaxChanged))
	);
	assert_eq!(
		Event::parse("nvim_buf_detach_event", vec![Value::Int(4)]),
		Ok(Event::Detach { buffer: 4 })
	);
	assert_eq!(
		Event::parse("nvim_something", Vec::new()),
		Err(EventError::UnknownMethod("nvim_something".into()))
	);
}

#[test]
fn malformed_events_are_rejected() {
	let cases: Vec<(&str, Vec<Value>)> = vec![
		("nvim_buf_lines_event", vec![Value::Int(1)]),
		("nvim_buf_lines_event", vec![Value::from("x"); 6]),
		("nvim_buf_changedtick_event", vec![Value::Int(1)]),
		("nvim_buf_detach_event", Vec::new()),
		("vim_event_update", vec![Value::UInt(8)]),
		("vim_event_update", vec![Value::from("stop")]),
	];
	for (method, params) in cases {
		let parsed = Event::parse(method, params);
		assert!(matches!(parsed, Err(EventError::Malformed { .. })), "{method}: {parsed:?}");
	}
	let mut bad_line = lines_event(1, 1, 0, 0, &[]);
	bad_line[4] = Value::Array(vec![Value::Int(3)]);
	assert!(Event::parse("nvim_buf_lines_event", bad_line).is_err());
}

#[test]
fn external_update_codes() {
	let all: Vec<_> = (0..8).filter_map(ExternalUpdate::from_code).collect();
	assert_eq!(all.len(), 8);
	assert_eq!(all[0], ExternalUpdate::BufNew);
	assert_eq!(all[7], ExternalUpdate::Exit);
	assert_eq!(ExternalUpdate::from_code(8), None);
}

#[test]
fn config_defaults_and_overrides() {
	let defaults = Config::default();
	assert_eq!(defaults.namespace, "taglight");
	assert_eq!(defaults.compression, Compression::Gzip);
	assert_eq!(defaults.request_timeout(), None);
	assert!(defaults.norecurse_dirs.contains(&PathBuf::from("/usr/include")));
	assert!(defaults.is_ignored(""));

	let parsed: Config = toml::from_str(
		r#"
		compression = "none"
		ignored_filetypes = ["help"]
		request_timeout_ms = 250

		[[project_dirs]]
		path = "/src/linux"
		filetype = "c"
		"#,
	)
	.unwrap();
	assert_eq!(parsed.compression, Compression::None);
	assert!(parsed.is_ignored("help"));
	assert_eq!(parsed.request_timeout(), Some(Duration::from_millis(250)));
	assert_eq!(parsed.project_dirs[0].path, PathBuf::from("/src/linux"));
	assert_eq!(parsed.namespace, "taglight");

	assert!(toml::from_str::<Config>("colour = 1").is_err());
}

#[test]
fn config_load_reads_project_dirs_file() {
	let dir = tempfile::tempdir().unwrap();
	let dirs_file = dir.path().join("project_dirs");
	std::fs::write(&dirs_file, "/src/linux\tc\nnot a pair\n").unwrap();
	let config_file = dir.path().join("taglight.toml");
	std::fs::write(
		&config_file,
		format!("project_dirs_file = {:?}\nnorecurse_dirs = []\n", dirs_file.display().to_string()),
	)
	.unwrap();

	let config = Config::load(&config_file).unwrap();
	let root = config.root_selector().unwrap().select(Path::new("/src/linux/kernel/fork.c"), "cpp");
	assert_eq!(root.key, PathBuf::from("/src/linux"));

	let missing = Config {
		project_dirs_file: Some(dir.path().join("absent")),
		..Config::default()
	};
	assert!(missing.root_selector().is_ok());

	assert!(matches!(
		Config::load(&dir.path().join("nope.toml")),
		Err(crate::Error::ConfigRead { .. })
	));
	std::fs::write(&config_file, "cache_dir = 3").unwrap();
	assert!(matches!(Config::load(&config_file), Err(crate::Error::ConfigParse { .. })));
}
