//! End-to-end scenarios for a single job driven by offers and status updates.
//!
//! Each test plays the cluster scheduler: it offers hosts, reports task
//! outcomes, and checks what the job reported back.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use tasket_core::JobConfig;
use tasket_sched::scheduler::{
    JobReport, Locality, ManualClock, SimpleJob, StaticResolver, StatusUpdate, Task, TaskId,
    TaskOutcome, TaskScheduler, new_shared_job, with_job,
};

struct FixedTask {
    id: TaskId,
    prefs: Vec<String>,
}

impl Task for FixedTask {
    fn id(&self) -> TaskId {
        self.id
    }
    fn preferred_locations(&self) -> Vec<String> {
        self.prefs.clone()
    }
}

#[derive(Default)]
struct Recorder {
    ended: Mutex<Vec<(TaskId, TaskOutcome)>>,
    finished: Mutex<Vec<JobReport>>,
    more_resources: Mutex<usize>,
    shutdowns: Mutex<usize>,
}

impl TaskScheduler for Recorder {
    fn task_ended(
        &self,
        task: &Arc<dyn Task>,
        outcome: TaskOutcome,
        _result: Option<Value>,
        _update: Option<Value>,
    ) {
        self.ended.lock().unwrap().push((task.id(), outcome));
    }
    fn job_finished(&self, report: &JobReport) {
        self.finished.lock().unwrap().push(report.clone());
    }
    fn request_more_resources(&self) {
        *self.more_resources.lock().unwrap() += 1;
    }
    fn shutdown(&self) {
        *self.shutdowns.lock().unwrap() += 1;
    }
}

fn tasks(prefs: &[&[&str]]) -> Vec<Arc<dyn Task>> {
    prefs
        .iter()
        .enumerate()
        .map(|(i, p)| {
            Arc::new(FixedTask {
                id: i as TaskId,
                prefs: p.iter().map(|s| s.to_string()).collect(),
            }) as Arc<dyn Task>
        })
        .collect()
}

fn build(prefs: &[&[&str]], resolver: StaticResolver) -> (SimpleJob, Arc<Recorder>, Arc<ManualClock>) {
    let recorder = Arc::new(Recorder::default());
    let clock = Arc::new(ManualClock::default());
    let job = SimpleJob::builder(7, recorder.clone(), tasks(prefs))
        .config(JobConfig::default())
        .clock(clock.clone())
        .resolver(Arc::new(resolver))
        .build();
    (job, recorder, clock)
}

#[test]
fn four_tasks_finish_in_order() {
    let (mut job, recorder, clock) = build(&[&[], &[], &[], &[]], StaticResolver::new());

    let launches: Vec<_> = ["n1", "n2", "n3", "n4"]
        .iter()
        .map(|h| job.slave_offer(h, 2).expect("no-preference tasks launch anywhere"))
        .collect();
    assert_eq!(
        launches.iter().map(|l| l.index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );

    clock.advance(Duration::from_secs(1));
    let mut last_finished = 0;
    for launch in &launches {
        assert!(recorder.finished.lock().unwrap().is_empty());
        job.status_update(StatusUpdate::finished(launch.task_id())).unwrap();
        assert!(job.tasks_finished() > last_finished);
        last_finished = job.tasks_finished();
    }

    assert_eq!(job.tasks_finished(), 4);
    let finished = recorder.finished.lock().unwrap();
    assert_eq!(finished.len(), 1);
    assert!(!finished[0].failed);
    assert_eq!(finished[0].tasks_finished, 4);
    assert_eq!(recorder.ended.lock().unwrap().len(), 4);
}

#[test]
fn task_lost_five_times_aborts_job() {
    let (mut job, recorder, _clock) = build(&[&[], &[], &[], &[]], StaticResolver::new());
    for host in ["n1", "n2", "n3", "n4"] {
        job.slave_offer(host, 1).unwrap();
    }

    for failure in 1..=5 {
        job.status_update(StatusUpdate::lost(2)).unwrap();
        if failure <= 4 {
            assert!(!job.failed(), "failure {failure} must not abort");
            assert_eq!(*recorder.shutdowns.lock().unwrap(), 0);
            let retry = job
                .slave_offer(&format!("retry{failure}"), 1)
                .expect("lost task is pending again");
            assert_eq!(retry.index, 2);
        }
    }

    assert!(job.failed());
    assert_eq!(job.num_failures(2), Some(5));
    assert_eq!(*recorder.more_resources.lock().unwrap(), 5);
    assert_eq!(*recorder.shutdowns.lock().unwrap(), 1);
    let finished = recorder.finished.lock().unwrap();
    assert_eq!(finished.len(), 1);
    assert!(finished[0].failed);
    assert_eq!(
        finished[0].cause_of_failure.as_deref(),
        Some("Task 2 failed more than 4 times")
    );
}

#[test]
fn offer_under_alias_selects_preferring_task() {
    let resolver = StaticResolver::new().with_host(
        "worker7.cluster.local",
        &["worker7"],
        &["192.168.10.7"],
    );
    let (mut job, _recorder, _clock) = build(
        &[&["worker3"], &["worker7.cluster.local"], &[]],
        resolver,
    );

    let launch = job.slave_offer("192.168.10.7", 1).expect("alias match");
    assert_eq!(launch.index, 1);
    assert_eq!(launch.locality, Locality::Preferred);
}

#[test]
fn fallback_after_locality_wait() {
    let (mut job, _recorder, clock) = build(&[&["worker3"]], StaticResolver::new());
    assert!(job.slave_offer("worker9", 1).is_none());

    clock.advance(job.config().locality_wait());
    let launch = job.slave_offer("worker9", 1).expect("non-local after the wait");
    assert_eq!(launch.locality, Locality::NonPreferred);
}

#[test]
fn mixed_outcomes_finish_job_once() {
    let (mut job, recorder, _clock) = build(&[&[], &[], &[]], StaticResolver::new());
    let a = job.slave_offer("n1", 1).unwrap();
    let b = job.slave_offer("n2", 1).unwrap();
    let c = job.slave_offer("n3", 1).unwrap();

    job.status_update(StatusUpdate::finished(a.task_id())).unwrap();
    job.status_update(StatusUpdate::killed(b.task_id())).unwrap();
    let b2 = job.slave_offer("n4", 1).unwrap();
    assert_eq!(b2.index, b.index);
    job.status_update(StatusUpdate::finished(b2.task_id())).unwrap();
    job.status_update(StatusUpdate::lost(c.task_id()).with_reason(
        tasket_sched::scheduler::FailureReason::FetchFailed {
            server_uri: "http://n9:5055".into(),
            shuffle_id: 1,
            map_id: 4,
            reduce_id: 2,
        },
    ))
    .unwrap();

    assert_eq!(job.tasks_finished(), 3);
    assert_eq!(recorder.finished.lock().unwrap().len(), 1);
    let ended = recorder.ended.lock().unwrap();
    assert!(matches!(ended.last(), Some((2, TaskOutcome::FetchFailure { map_id: 4, .. }))));
}

#[test]
fn shared_job_serializes_concurrent_offers() {
    let prefs: Vec<&[&str]> = vec![&[]; 64];
    let (job, _recorder, _clock) = build(&prefs, StaticResolver::new());
    let shared = new_shared_job(job);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                let mut launched = Vec::new();
                for round in 0.. {
                    let host = format!("w{worker}-{round}");
                    match with_job(&shared, |job| job.slave_offer(&host, 1)).unwrap() {
                        Some(launch) => launched.push(launch.index),
                        None => break,
                    }
                }
                launched
            })
        })
        .collect();

    let all: Vec<usize> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    let unique: HashSet<usize> = all.iter().copied().collect();
    assert_eq!(all.len(), 64);
    assert_eq!(unique.len(), 64);
    assert_eq!(with_job(&shared, |job| job.tasks_launched()).unwrap(), 64);
}
