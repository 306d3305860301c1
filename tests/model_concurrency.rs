//! Concurrency tests for the launch/tab/server model
//!
//! These drive the model from many threads at once, the way delivery threads
//! and command threads do in a live session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use launchwatch_core::{AttentionLevel, Error};
use launchwatch_model::test_utils::{
    entry, keyed_tab_info, tab_info, RecordingListener, StubLaunch,
};
use launchwatch_model::{
    BrowserTab, LaunchConfiguration, LogEntryView, LogListener, ModelListener, ModuleHandle,
    Registry,
};

const THREADS: usize = 8;
const PER_THREAD: u64 = 250;

fn launch_with_recorder() -> (Registry, Arc<LaunchConfiguration>, Arc<RecordingListener>) {
    let registry = Registry::new();
    let recorder = Arc::new(RecordingListener::default());
    registry.add_listener(recorder.clone());
    let launch = registry.create_launch_configuration(Arc::new(StubLaunch::new("app")), "app");
    (registry, launch, recorder)
}

fn new_tab(launch: &LaunchConfiguration, url: &str) -> Arc<BrowserTab> {
    launch
        .add_browser_tab(tab_info("Chrome", url), ModuleHandle::new("main", "s1"))
        .expect("launch is active")
}

/// Counts new entries and remembers whether they arrived in commit order
#[derive(Default)]
struct CountingLogListener {
    entries: AtomicUsize,
    last_id: AtomicUsize,
    out_of_order: AtomicUsize,
}

impl LogListener for CountingLogListener {
    fn new_log_entry(
        &self,
        _insertion_index: usize,
        entry: &LogEntryView,
        _needs_attention: bool,
        _parents_changed: bool,
    ) {
        self.entries.fetch_add(1, Ordering::SeqCst);
        let previous = self.last_id.swap(entry.id.index(), Ordering::SeqCst);
        if previous >= entry.id.index() || !entry.disclosed {
            self.out_of_order.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn concurrent_module_streams_all_land_exactly_once() {
    let (_registry, launch, _recorder) = launch_with_recorder();
    let tab = new_tab(&launch, "http://localhost/");
    let counter = Arc::new(CountingLogListener::default());
    tab.log().add_listener(counter.clone());

    thread::scope(|s| {
        for t in 0..THREADS {
            let tab = Arc::clone(&tab);
            s.spawn(move || {
                let module = ModuleHandle::new(format!("module-{t}"), "s1");
                // Deliver each stream out of order, with one redelivery per entry
                for index in (1..=PER_THREAD).rev() {
                    let log = tab.log();
                    log.append(log.root(), entry("line", "INFO"), index, module.clone())
                        .unwrap();
                    log.append(log.root(), entry("again", "INFO"), index, module.clone())
                        .unwrap();
                }
            });
        }
    });

    let total = THREADS * PER_THREAD as usize;
    let children = tab.log().all_children(tab.log().root()).unwrap();
    assert_eq!(children.len(), total);
    assert_eq!(counter.entries.load(Ordering::SeqCst), total);
    assert_eq!(counter.out_of_order.load(Ordering::SeqCst), 0);

    for t in 0..THREADS {
        let name = format!("module-{t}");
        let indices: Vec<u64> = children
            .iter()
            .filter(|c| c.module.as_ref().is_some_and(|m| m.name == name))
            .map(|c| c.index)
            .collect();
        assert_eq!(indices, (1..=PER_THREAD).collect::<Vec<_>>());
    }
}

#[test]
fn concurrent_set_server_succeeds_exactly_once() {
    let (_registry, launch, recorder) = launch_with_recorder();
    let winners = AtomicUsize::new(0);
    let refusals = AtomicUsize::new(0);

    thread::scope(|s| {
        for t in 0..THREADS {
            let launch = Arc::clone(&launch);
            let winners = &winners;
            let refusals = &refusals;
            s.spawn(move || match launch.set_server(format!("server-{t}")) {
                Ok(Some(_)) => {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                Err(Error::ServerAlreadySet { .. }) => {
                    refusals.fetch_add(1, Ordering::SeqCst);
                }
                other => panic!("unexpected set_server result: {:?}", other),
            });
        }
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(refusals.load(Ordering::SeqCst), THREADS - 1);
    assert_eq!(recorder.count("server_created"), 1);
}

#[test]
fn terminate_races_with_deliveries_without_deadlock() {
    let (_registry, launch, recorder) = launch_with_recorder();
    let tabs: Vec<_> = (0..THREADS)
        .map(|t| new_tab(&launch, &format!("http://localhost/{t}")))
        .collect();

    thread::scope(|s| {
        for tab in &tabs {
            let tab = Arc::clone(tab);
            s.spawn(move || {
                let module = ModuleHandle::new("main", "s1");
                for index in 1..=PER_THREAD {
                    let log = tab.log();
                    log.append(
                        log.root(),
                        entry("warn", "WARN").needing_attention(),
                        index,
                        module.clone(),
                    )
                    .unwrap();
                }
            });
        }
        let launch = Arc::clone(&launch);
        s.spawn(move || {
            thread::yield_now();
            assert!(launch.set_terminated());
        });
    });

    assert!(launch.is_terminated());
    for tab in &tabs {
        assert!(tab.is_terminated());
        assert_eq!(tab.needs_attention_level(), None);
    }
    assert_eq!(recorder.count("launch_configuration_terminated"), 1);
    assert_eq!(recorder.count("browser_tab_terminated"), THREADS);
}

#[test]
fn same_name_tabs_terminating_in_turn_leave_the_last() {
    let (_registry, launch, recorder) = launch_with_recorder();
    let module = ModuleHandle::new("main", "s1");
    let tabs: Vec<_> = (0..4).map(|_| new_tab(&launch, "http://localhost/")).collect();

    for tab in &tabs {
        assert!(tab.remove_module(&module));
    }

    let remaining = launch.browser_tabs();
    assert_eq!(remaining.len(), 1);
    assert!(Arc::ptr_eq(&remaining[0], tabs.last().unwrap()));
    assert_eq!(recorder.count("browser_tab_removed"), 3);
}

#[test]
fn same_name_tabs_terminating_concurrently_leave_one() {
    let (_registry, launch, _recorder) = launch_with_recorder();
    let tabs: Vec<_> = (0..THREADS)
        .map(|_| new_tab(&launch, "http://localhost/"))
        .collect();

    thread::scope(|s| {
        for tab in &tabs {
            let tab = Arc::clone(tab);
            s.spawn(move || {
                tab.remove_module(&ModuleHandle::new("main", "s1"));
            });
        }
    });

    let remaining = launch.browser_tabs();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].is_terminated());
}

/// Listener that mutates the model from inside every tab callback
struct ReloadingListener {
    launch: Arc<LaunchConfiguration>,
}

impl ModelListener for ReloadingListener {
    fn browser_tab_terminated(&self, tab: &Arc<BrowserTab>) {
        // A reload: the same page reconnects in a fresh tab record
        let _ = self
            .launch
            .add_browser_tab(tab.info().clone(), ModuleHandle::new("main", "s2"));
    }

    fn browser_tab_created(&self, tab: &Arc<BrowserTab>) {
        tab.set_needs_attention_level(Some(AttentionLevel::Info));
    }
}

#[test]
fn listeners_can_mutate_the_model_reentrantly() {
    let (registry, launch, recorder) = launch_with_recorder();
    registry.add_listener(Arc::new(ReloadingListener {
        launch: Arc::clone(&launch),
    }));
    let tab = new_tab(&launch, "http://localhost/");

    tab.remove_module(&ModuleHandle::new("main", "s1"));

    let tabs = launch.browser_tabs();
    assert_eq!(tabs.len(), 2);
    assert!(tabs[0].is_terminated());
    assert!(!tabs[1].is_terminated());
    assert_eq!(tabs[1].needs_attention_level(), Some(AttentionLevel::Info));
    assert_eq!(recorder.count("browser_tab_created"), 2);
}

#[test]
fn reconnect_racing_terminate_never_leaves_an_active_tab() {
    let module = ModuleHandle::new("main", "s1");
    let info = keyed_tab_info("tab-1", "Chrome", "http://localhost/");

    for _ in 0..200 {
        let (_registry, launch, _recorder) = launch_with_recorder();
        let tab = launch
            .find_or_add_browser_tab(info.clone(), module.clone())
            .expect("launch is active");
        tab.remove_module(&module);
        let barrier = Barrier::new(2);

        thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                launch.find_or_add_browser_tab(info.clone(), module.clone());
            });
            s.spawn(|| {
                barrier.wait();
                launch.set_terminated();
            });
        });

        assert!(launch.is_terminated());
        for tab in launch.browser_tabs() {
            assert!(tab.is_terminated(), "tab {} outlived its launch", tab.id());
        }
    }
}
