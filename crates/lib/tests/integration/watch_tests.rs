use std::time::Duration;

use knit_lib::build::{BuildStatus, Coordinator};
use knit_lib::watch::{FsWatcher, WatchEvent, WatchLoop};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::common::TestProject;

const TIMEOUT: Duration = Duration::from_secs(10);

async fn until(events: &mut mpsc::UnboundedReceiver<WatchEvent>, pred: impl Fn(&WatchEvent) -> bool) -> WatchEvent {
  loop {
    let event = tokio::time::timeout(TIMEOUT, events.recv())
      .await
      .expect("timed out waiting for watch event")
      .expect("watch loop ended");
    if pred(&event) {
      return event;
    }
  }
}

#[tokio::test]
async fn rebuilds_when_a_file_changes_on_disk() {
  let project = TestProject::new();
  project.write("index.js", "import './dep';\nmain();\n");
  let dep = project.write("dep.js", "dep();\n");

  let config = project.config();
  let watcher = FsWatcher::new(project.root().join("src"), config.extensions.clone());
  let mut watch = WatchLoop::new(Coordinator::new(config)).with_debounce(Duration::from_millis(50));
  let stop = CancellationToken::new();
  let (tx, mut events) = mpsc::unbounded_channel();

  let driver = async {
    let first = until(&mut events, |e| matches!(e, WatchEvent::BuildFinished { .. })).await;
    assert!(matches!(
      first,
      WatchEvent::BuildFinished {
        generation: 1,
        status: BuildStatus::Succeeded,
        ..
      }
    ));

    std::fs::write(&dep, "dep2();\n").unwrap();

    // The write may arrive as more than one batch; wait for the build that sees it.
    loop {
      let next = until(&mut events, |e| matches!(e, WatchEvent::BuildFinished { .. })).await;
      let WatchEvent::BuildFinished {
        generation, status, ..
      } = next
      else {
        unreachable!();
      };
      assert!(generation > 1);
      assert_eq!(status, BuildStatus::Succeeded);
      if project.bundle().contains("dep2();") {
        break;
      }
    }
    stop.cancel();
  };

  let report = move |event: WatchEvent| {
    println!("{}", event.to_json());
    let _ = tx.send(event);
  };
  let (result, ()) = tokio::join!(watch.run(watcher, stop.clone(), report), driver);
  result.unwrap();
}

#[tokio::test]
async fn stop_before_any_change_still_reports_stopped() {
  let project = TestProject::new();
  project.write("index.js", "main();\n");

  let config = project.config();
  let watcher = FsWatcher::new(project.root().join("src"), config.extensions.clone());
  let mut watch = WatchLoop::new(Coordinator::new(config));
  let stop = CancellationToken::new();
  let (tx, mut events) = mpsc::unbounded_channel();

  let driver = async {
    until(&mut events, |e| matches!(e, WatchEvent::BuildFinished { .. })).await;
    stop.cancel();
    until(&mut events, |e| *e == WatchEvent::Stopped).await;
  };

  let report = move |event: WatchEvent| {
    let _ = tx.send(event);
  };
  let (result, ()) = tokio::join!(watch.run(watcher, stop.clone(), report), driver);
  result.unwrap();
  assert!(project.output().exists());
}
