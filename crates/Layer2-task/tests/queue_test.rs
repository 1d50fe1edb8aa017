//! Queue integration tests - real `/bin/sh` children
//!
//! `cargo test -p sluice-task --test queue_test -- --nocapture`

use sluice_foundation::{DefaultPolicy, Error, FixedEnvironment, QueueConfig};
use sluice_task::{Task, TaskCallbacks, TaskQueue, TaskRunner, TaskSpec, TaskVerdict};
use std::cell::RefCell;

fn sh(script: &str) -> TaskSpec {
    TaskSpec::new("/bin/sh").args(["-c", script])
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Began(&'static str),
    Finished(&'static str, i32),
    Signalled(&'static str, i32),
}

/// Run the queue, recording every callback in order
fn run_recording(
    queue: &mut TaskQueue<&'static str>,
    verdict: impl Fn(&Event) -> TaskVerdict,
) -> (sluice_foundation::Result<()>, Vec<Event>) {
    let events = RefCell::new(Vec::new());
    let result = queue.execute(
        TaskCallbacks::new()
            .on_began(|task: &Task<&'static str>| {
                events.borrow_mut().push(Event::Began(*task.context()))
            })
            .on_finished(|task: &Task<&'static str>, code| {
                let event = Event::Finished(*task.context(), code);
                let v = verdict(&event);
                events.borrow_mut().push(event);
                v
            })
            .on_signalled(|task: &Task<&'static str>, signal| {
                let event = Event::Signalled(*task.context(), signal.number);
                let v = verdict(&event);
                events.borrow_mut().push(event);
                v
            }),
    );
    (result, events.into_inner())
}

#[test]
fn test_three_clean_exits_with_two_slots() {
    let mut queue = TaskQueue::new(QueueConfig::new(2));
    for name in ["a", "b", "c"] {
        queue.add_task(sh("exit 0"), name).expect("add failed");
    }

    let (result, events) = run_recording(&mut queue, |_| TaskVerdict::Continue);
    println!("Events: {:?}", events);

    assert!(result.is_ok());
    let began = events.iter().filter(|e| matches!(e, Event::Began(_))).count();
    let finished: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, Event::Finished(_, 0)))
        .collect();
    assert_eq!(began, 3);
    assert_eq!(finished.len(), 3);

    let stats = queue.stats();
    assert_eq!(stats.launched, 3);
    assert_eq!(stats.exited, 3);
    assert_eq!(stats.dropped, 0);
    assert!(stats.peak_executing <= 2);
}

#[test]
fn test_output_is_byte_exact() {
    let mut queue = TaskQueue::new(QueueConfig::new(1));
    queue.add_task(sh("printf hello"), ()).unwrap();

    let output = RefCell::new(Vec::new());
    let code = RefCell::new(None);
    queue
        .execute(TaskCallbacks::new().on_finished(|task: &Task<()>, exit| {
            output.borrow_mut().extend_from_slice(task.output());
            *code.borrow_mut() = Some(exit);
            TaskVerdict::Continue
        }))
        .expect("batch failed");

    assert_eq!(output.into_inner(), b"hello");
    assert_eq!(code.into_inner(), Some(0));
}

#[test]
fn test_stderr_separate_and_merged() {
    let script = "printf out1; printf err >&2; printf out2";
    let mut queue = TaskQueue::new(QueueConfig::new(2));
    queue.add_task(sh(script).separate_errors(true), "separate").unwrap();
    queue.add_task(sh(script).separate_errors(false), "merged").unwrap();

    let captured = RefCell::new(Vec::new());
    queue
        .execute(TaskCallbacks::new().on_finished(|task: &Task<&'static str>, _| {
            captured.borrow_mut().push((
                *task.context(),
                task.output().to_vec(),
                task.errors().map(<[u8]>::to_vec),
            ));
            TaskVerdict::Continue
        }))
        .unwrap();

    let captured = captured.into_inner();
    let separate = captured.iter().find(|c| c.0 == "separate").unwrap();
    assert_eq!(separate.1, b"out1out2");
    assert_eq!(separate.2.as_deref(), Some(&b"err"[..]));

    let merged = captured.iter().find(|c| c.0 == "merged").unwrap();
    assert_eq!(merged.1, b"out1errout2");
    assert!(merged.2.is_none());
}

#[test]
fn test_signal_reported_and_finished_not_fired() {
    let mut queue = TaskQueue::new(QueueConfig::new(1));
    queue.add_task(sh("kill -9 $$"), "killed").unwrap();

    let description = RefCell::new(String::new());
    let finished_fired = RefCell::new(false);
    let result = queue.execute(
        TaskCallbacks::new()
            .on_finished(|_: &Task<&'static str>, _| {
                *finished_fired.borrow_mut() = true;
                TaskVerdict::Continue
            })
            .on_signalled(|_: &Task<&'static str>, signal| {
                assert_eq!(signal.number, 9);
                *description.borrow_mut() = signal.description.clone();
                TaskVerdict::Continue
            }),
    );

    assert!(result.is_ok());
    assert!(!finished_fired.into_inner());
    let description = description.into_inner();
    println!("Signal description: {}", description);
    assert!(!description.is_empty());
    assert_eq!(queue.stats().signalled, 1);
}

#[test]
fn test_default_policy_stops_on_signal() {
    let mut queue = TaskQueue::new(QueueConfig::new(1));
    queue.add_task(sh("kill -TERM $$"), "first").unwrap();
    queue.add_task(sh("exit 0"), "second").unwrap();

    let result = queue.execute(TaskCallbacks::new());
    let err = result.expect_err("signal should stop the batch");
    assert!(err.is_policy_stop());
    assert_eq!(queue.stats().launched, 1);
    assert_eq!(queue.stats().dropped, 1);
}

#[test]
fn test_keep_going_policy_ignores_failures() {
    let config = QueueConfig::new(2).with_policy(DefaultPolicy::keep_going());
    let mut queue = TaskQueue::new(config);
    queue.add_task(sh("exit 1"), ()).unwrap();
    queue.add_task(sh("kill -TERM $$"), ()).unwrap();
    queue.add_task(sh("exit 0"), ()).unwrap();

    queue.execute(TaskCallbacks::new()).expect("keep-going batch failed");
    assert_eq!(queue.stats().completed(), 3);
}

#[test]
fn test_stop_verdict_drops_queued_tasks() {
    let mut queue = TaskQueue::new(QueueConfig::new(1));
    queue.add_task(sh("exit 3"), "fails").unwrap();
    queue.add_task(sh("exit 0"), "never1").unwrap();
    queue.add_task(sh("exit 0"), "never2").unwrap();

    let (result, events) = run_recording(&mut queue, |event| match event {
        Event::Finished(_, code) if *code != 0 => TaskVerdict::Stop,
        _ => TaskVerdict::Continue,
    });

    assert!(matches!(result, Err(Error::Stopped(_))));
    assert_eq!(events, vec![Event::Began("fails"), Event::Finished("fails", 3)]);
    assert_eq!(queue.stats().dropped, 2);
    assert_eq!(queue.pending_len(), 0);
}

#[test]
fn test_stop_lets_running_tasks_finish() {
    let mut queue = TaskQueue::new(QueueConfig::new(2));
    queue.add_task(sh("exit 5"), "fast").unwrap();
    queue.add_task(sh("sleep 0.3; exit 0"), "slow").unwrap();
    queue.add_task(sh("exit 0"), "queued").unwrap();

    let (result, events) = run_recording(&mut queue, |event| match event {
        Event::Finished("fast", _) => TaskVerdict::Stop,
        _ => TaskVerdict::Continue,
    });

    println!("Events: {:?}", events);
    assert!(result.is_err());
    assert!(events.contains(&Event::Finished("slow", 0)));
    assert!(!events.contains(&Event::Began("queued")));
}

#[test]
fn test_fifo_order_with_one_slot() {
    let mut queue = TaskQueue::new(QueueConfig::new(1));
    for name in ["A", "B", "C"] {
        queue.add_task(sh("exit 0"), name).unwrap();
    }

    let (result, events) = run_recording(&mut queue, |_| TaskVerdict::Continue);
    assert!(result.is_ok());
    assert_eq!(
        events,
        vec![
            Event::Began("A"),
            Event::Finished("A", 0),
            Event::Began("B"),
            Event::Finished("B", 0),
            Event::Began("C"),
            Event::Finished("C", 0),
        ]
    );
}

#[test]
fn test_parallelism_bound_holds() {
    for limit in [1usize, 2, 3] {
        let mut queue = TaskQueue::new(QueueConfig::new(limit));
        for _ in 0..7 {
            queue.add_task(sh("sleep 0.05"), ()).unwrap();
        }

        let running = RefCell::new(0usize);
        let peak = RefCell::new(0usize);
        queue
            .execute(
                TaskCallbacks::new()
                    .on_began(|_: &Task<()>| {
                        let mut running = running.borrow_mut();
                        *running += 1;
                        let mut peak = peak.borrow_mut();
                        *peak = (*peak).max(*running);
                    })
                    .on_finished(|_: &Task<()>, _| {
                        *running.borrow_mut() -= 1;
                        TaskVerdict::Continue
                    }),
            )
            .unwrap();

        let peak = peak.into_inner();
        println!("limit {} peak {}", limit, peak);
        assert!(peak <= limit);
        assert_eq!(queue.stats().peak_executing, peak);
        assert_eq!(queue.stats().launched, 7);
    }
}

#[test]
fn test_zero_parallelism_runs_serially() {
    let mut queue = TaskQueue::new(QueueConfig::new(0));
    queue.add_task(sh("exit 0"), ()).unwrap();
    queue.add_task(sh("exit 0"), ()).unwrap();

    queue.execute(TaskCallbacks::new()).unwrap();
    assert_eq!(queue.stats().peak_executing, 1);
    assert_eq!(queue.stats().exited, 2);
}

#[test]
fn test_environment_provider_and_override() {
    let provider = FixedEnvironment::new().with_var("GREETING", "from-provider");
    let mut queue = TaskQueue::with_environment(QueueConfig::new(2), provider);
    queue
        .add_task(sh("printf \"$GREETING\""), "inherit")
        .unwrap();
    queue
        .add_task(
            sh("printf \"${GREETING:-none}:$OWN\"").env(["OWN=mine"]),
            "override",
        )
        .unwrap();

    let outputs = RefCell::new(Vec::new());
    queue
        .execute(TaskCallbacks::new().on_finished(|task: &Task<&'static str>, _| {
            outputs
                .borrow_mut()
                .push((*task.context(), String::from_utf8_lossy(task.output()).into_owned()));
            TaskVerdict::Continue
        }))
        .unwrap();

    let mut outputs = outputs.into_inner();
    outputs.sort();
    assert_eq!(
        outputs,
        vec![
            ("inherit", "from-provider".to_string()),
            ("override", "none:mine".to_string()),
        ]
    );
}

#[test]
fn test_spawn_failure_fails_batch_without_callback() {
    let mut queue = TaskQueue::new(QueueConfig::new(2));
    queue.add_task(sh("sleep 0.1"), "running").unwrap();
    queue
        .add_task(TaskSpec::new("/nonexistent/binary"), "missing")
        .unwrap();
    queue.add_task(sh("exit 0"), "after").unwrap();

    let (result, events) = run_recording(&mut queue, |_| TaskVerdict::Continue);

    let err = result.expect_err("spawn failure should fail the batch");
    assert!(matches!(err, Error::Spawn { .. }));
    assert!(events.contains(&Event::Finished("running", 0)));
    assert!(!events.contains(&Event::Began("missing")));
    assert!(!events.contains(&Event::Began("after")));
    assert_eq!(queue.stats().dropped, 1);
}

#[test]
fn test_wait_failure_lets_running_task_complete() {
    let mut queue = TaskQueue::new(QueueConfig::new(2));
    queue
        .add_task(sh("sleep 0.3; exec head -c 200000 /dev/zero"), "writer")
        .unwrap();
    queue.add_task(sh("exit 0"), "stolen").unwrap();

    let events = RefCell::new(Vec::new());
    let writer_output = RefCell::new(0);
    let result = queue.execute(
        TaskCallbacks::new()
            .on_began(|task: &Task<&'static str>| {
                if *task.context() == "stolen" {
                    // Reap it behind the queue's back so its own wait finds no child
                    let pid = task.pid().unwrap() as libc::pid_t;
                    let mut status = 0;
                    assert_eq!(unsafe { libc::waitpid(pid, &mut status, 0) }, pid);
                }
            })
            .on_finished(|task: &Task<&'static str>, code| {
                if *task.context() == "writer" {
                    *writer_output.borrow_mut() = task.output().len();
                }
                events.borrow_mut().push(Event::Finished(*task.context(), code));
                TaskVerdict::Continue
            })
            .on_signalled(|task: &Task<&'static str>, signal| {
                events
                    .borrow_mut()
                    .push(Event::Signalled(*task.context(), signal.number));
                TaskVerdict::Continue
            }),
    );

    let events = events.into_inner();
    println!("Result: {:?}, events: {:?}", result, events);
    assert!(matches!(result, Err(Error::Wait { .. })));
    assert_eq!(events, vec![Event::Finished("writer", 0)]);
    assert_eq!(writer_output.into_inner(), 200000);

    let stats = queue.stats();
    assert_eq!(stats.launched, 2);
    assert_eq!(stats.exited, 1);
    assert_eq!(stats.signalled, 0);
}

#[test]
fn test_large_output_does_not_deadlock() {
    let mut queue = TaskQueue::new(QueueConfig::new(2));
    queue
        .add_task(sh("head -c 200000 /dev/zero"), "big")
        .unwrap();
    queue
        .add_task(sh("head -c 200000 /dev/zero >&2").separate_errors(false), "big-merged")
        .unwrap();

    let sizes = RefCell::new(Vec::new());
    queue
        .execute(TaskCallbacks::new().on_finished(|task: &Task<&'static str>, _| {
            sizes.borrow_mut().push((
                *task.context(),
                task.output().len(),
                task.errors().map(<[u8]>::len),
            ));
            TaskVerdict::Continue
        }))
        .unwrap();

    let mut sizes = sizes.into_inner();
    sizes.sort();
    assert_eq!(sizes, vec![("big", 200000, None), ("big-merged", 200000, None)]);
}

#[test]
fn test_queue_is_reusable_across_batches() {
    let mut queue = TaskQueue::new(QueueConfig::new(1));
    queue.add_task(sh("exit 2"), ()).unwrap();
    assert!(queue.execute(TaskCallbacks::new()).is_err());

    queue.add_task(sh("exit 0"), ()).unwrap();
    assert!(queue.execute(TaskCallbacks::new()).is_ok());
    assert_eq!(queue.stats().launched, 1);
}
