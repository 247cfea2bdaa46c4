// Pipeline runtime: lane wiring, per-task acknowledgement, backpressure,
// halt propagation and watchdog supervision.

mod common;

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use crossbeam::channel::TrySendError;

    use skyhook_core::codec::{DataType, TypedPayload};
    use skyhook_core::collaborator::Collaborator;
    use skyhook_core::operator::{Operator, PipelinedOperator, Task};
    use skyhook_core::pipeline::health::spawn_lane;
    use skyhook_core::pipeline::{
        lane_queue, recv_or_halt, send_or_halt, FailureHook, HaltSwitch, LaneHealth, LaneReport, LaneRole,
        LaneStatus, PipelineJob, PipelineProfile, PipelineRuntime, PipelineConfig,
    };
    use skyhook_core::protocol::{MetaPacket, SidebandWriter};
    use skyhook_core::transform::{Transform, TransformError, TransformFactory};
    use skyhook_core::types::WorkerError;

    use crate::common::{encode_chunks, image_chunk, item, FailingTransform, MemoryCollaborator, PixelSumTransform, SharedBuf};

    // ------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------

    fn factory<T: Transform + 'static>(make: fn() -> T) -> TransformFactory {
        Arc::new(move || Ok::<_, TransformError>(Box::new(make()) as Box<dyn Transform>))
    }

    fn recording_hook() -> (FailureHook, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook: FailureHook = Arc::new(move |e: &WorkerError| sink.lock().unwrap().push(e.to_string()));
        (hook, seen)
    }

    fn start(
        collab: &Arc<MemoryCollaborator>,
        transform: TransformFactory,
        lanes: usize,
        acks: &SharedBuf,
        hook: FailureHook,
    ) -> PipelineRuntime {
        let collaborator: Arc<dyn Collaborator> = collab.clone();
        PipelineRuntime::start(PipelineConfig {
            meta: MetaPacket::from_types(&[DataType::Image], &[DataType::Int]),
            collaborator,
            transform,
            profile: PipelineProfile { lanes, watchdog_interval_ms: 20, max_open_tasks: 4 },
            acks: SidebandWriter::new(acks.clone()),
            on_failure: hook,
        })
        .unwrap()
    }

    fn job(id: u64, key: &str) -> PipelineJob {
        PipelineJob { request_id: id, task: Task::new(key, vec![item(key)]) }
    }

    fn wait_until(limit: Duration, cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    // ------------------------------------------------------------
    // Queues and halt
    // ------------------------------------------------------------

    #[test]
    fn lane_queue_holds_one_message() {
        let (tx, _rx) = lane_queue::<u32>();
        tx.try_send(1).unwrap();
        assert!(matches!(tx.try_send(2), Err(TrySendError::Full(2))));
    }

    #[test]
    fn tripped_halt_aborts_blocked_receive() {
        let halt = Arc::new(HaltSwitch::new());
        let signal = halt.signal();
        let (_tx, rx) = lane_queue::<u32>();

        let waiter = thread::spawn(move || recv_or_halt(&rx, &signal));
        thread::sleep(Duration::from_millis(20));
        halt.trip();

        assert!(matches!(waiter.join().unwrap(), Err(WorkerError::Halted)));
        assert!(halt.is_tripped());
    }

    #[test]
    fn tripped_halt_aborts_blocked_send() {
        let halt = HaltSwitch::new();
        let (tx, _rx) = lane_queue::<u32>();
        tx.try_send(0).unwrap();
        halt.trip();
        assert!(matches!(send_or_halt(&tx, 1, &halt.signal()), Err(WorkerError::Halted)));
    }

    #[test]
    fn panicking_lane_is_marked_failed() {
        let health = LaneHealth::new(LaneRole::Compute, None);
        let handle = spawn_lane(health.clone(), || -> Result<LaneReport, WorkerError> { panic!("boom") }).unwrap();

        assert!(handle.join().is_err());
        assert_eq!(health.status(), LaneStatus::Failed);
        assert_eq!(health.failure().as_deref(), Some("lane panicked"));
    }

    #[test]
    fn lanes_are_named_by_role_and_index() {
        assert_eq!(LaneHealth::new(LaneRole::Ingress, Some(2)).name(), "ingress-2");
        assert_eq!(LaneHealth::new(LaneRole::Compute, None).name(), "compute");
    }

    // ------------------------------------------------------------
    // End to end
    // ------------------------------------------------------------

    #[test]
    fn every_task_is_built_then_acknowledged() {
        let keys = ["a", "b", "c", "d", "e"];
        let mut collab = MemoryCollaborator::new();
        for (i, key) in keys.iter().enumerate() {
            let chunks = vec![vec![image_chunk(2, 1, 1, i as u8)], vec![image_chunk(1, 1, 1, 100)]];
            collab = collab.with_stream(key, encode_chunks(&[DataType::Image], &chunks));
        }
        let collab = Arc::new(collab);
        let acks = SharedBuf::default();
        let (hook, failures) = recording_hook();

        let runtime = start(&collab, factory(|| PixelSumTransform), 2, &acks, hook);
        for (i, key) in keys.iter().enumerate() {
            runtime.submit(job(i as u64 + 10, key)).unwrap();
        }
        let snapshot = runtime.close().unwrap();

        let mut acked = acks.acked_ids();
        acked.sort_unstable();
        assert_eq!(acked, vec![10, 11, 12, 13, 14]);
        assert!(acks.responses().iter().all(|r| r.get("JSON").is_none()));

        for (i, key) in keys.iter().enumerate() {
            let build = collab.build_for(key);
            let fill = i as i64 * 3;
            let chunks = build.payloads(&[DataType::Int]);
            assert_eq!(
                chunks,
                vec![vec![TypedPayload::Int(vec![fill, fill + 3])], vec![TypedPayload::Int(vec![300])]]
            );
        }

        assert_eq!(snapshot.lanes, 2);
        assert_eq!(snapshot.tasks, 5);
        assert_eq!(snapshot.chunks, 10);
        assert_eq!(snapshot.elements, 15);
        assert!(snapshot.bytes_out > 0);
        assert!(failures.lock().unwrap().is_empty());
    }

    #[test]
    fn ack_waits_for_its_own_lane_while_the_other_lane_finishes() {
        let slow_chunks: Vec<Vec<TypedPayload>> = (0..3).map(|i| vec![image_chunk(1, 1, 1, i)]).collect();
        let (collab, release) = MemoryCollaborator::new()
            .with_stream("slow", encode_chunks(&[DataType::Image], &slow_chunks))
            .with_stream("fast", encode_chunks(&[DataType::Image], &[vec![image_chunk(1, 1, 1, 9)]]))
            .with_reader_latch("slow");
        let collab = Arc::new(collab);
        let acks = SharedBuf::default();
        let (hook, failures) = recording_hook();

        let runtime = start(&collab, factory(|| PixelSumTransform), 2, &acks, hook);
        // The slow lane's ingress holds before Close, so "fast" lands on the other lane.
        runtime.submit(job(1, "slow")).unwrap();
        runtime.submit(job(2, "fast")).unwrap();

        assert!(wait_until(Duration::from_secs(5), || acks.acked_ids() == vec![2]));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(acks.acked_ids(), vec![2]);
        assert!(!collab.has_build("slow"));

        release.send(()).unwrap();
        runtime.close().unwrap();

        assert_eq!(acks.acked_ids(), vec![2, 1]);
        let build = collab.build_for("slow");
        assert_eq!(
            build.payloads(&[DataType::Int]),
            vec![vec![TypedPayload::Int(vec![0])], vec![TypedPayload::Int(vec![3])], vec![TypedPayload::Int(vec![6])]]
        );
        assert!(failures.lock().unwrap().is_empty());
    }

    #[test]
    fn task_without_chunks_is_still_acknowledged() {
        let collab = Arc::new(MemoryCollaborator::new());
        let acks = SharedBuf::default();
        let (hook, _) = recording_hook();

        let runtime = start(&collab, factory(|| PixelSumTransform), 1, &acks, hook);
        runtime.submit(job(1, "nothing")).unwrap();
        runtime.close().unwrap();

        assert_eq!(acks.acked_ids(), vec![1]);
        let build = collab.build_for("nothing");
        assert!(build.chunks.is_empty());
        assert_eq!(build.metas[0]["Metadata"], "{}");
    }

    #[test]
    fn pipelined_operator_defers_acks_to_egress() {
        let stream = encode_chunks(&[DataType::Image], &[vec![image_chunk(1, 1, 1, 1)]]);
        let collab = Arc::new(MemoryCollaborator::new().with_stream("k", stream));
        let acks = SharedBuf::default();
        let (hook, _) = recording_hook();

        let mut op = PipelinedOperator::new(start(&collab, factory(|| PixelSumTransform), 2, &acks, hook));
        assert_eq!(op.parallelism(), 2);

        let outcome = op.apply(42, Task::new("k", vec![item("k")])).unwrap();
        assert_eq!(outcome, skyhook_core::operator::ApplyOutcome::Deferred);

        op.close().unwrap();
        assert_eq!(acks.acked_ids(), vec![42]);
        assert_eq!(op.snapshot().map(|s| s.tasks), Some(1));
    }

    // ------------------------------------------------------------
    // Supervision
    // ------------------------------------------------------------

    #[test]
    fn compute_failure_halts_every_lane() {
        let stream = encode_chunks(&[DataType::Image], &[vec![image_chunk(1, 1, 1, 1)]]);
        let collab = Arc::new(MemoryCollaborator::new().with_stream("k", stream));
        let acks = SharedBuf::default();
        let (hook, failures) = recording_hook();

        let runtime = start(&collab, factory(|| FailingTransform), 2, &acks, hook);
        runtime.submit(job(1, "k")).unwrap();

        assert!(wait_until(Duration::from_secs(5), || runtime.is_halted()));
        assert!(wait_until(Duration::from_secs(5), || {
            runtime.lane_states().iter().all(|(_, s)| s.is_terminated())
        }));

        let states = runtime.lane_states();
        assert_eq!(states.len(), 5);
        assert!(states.iter().any(|(name, s)| name == "compute" && *s == LaneStatus::Failed));

        let err = runtime.close().unwrap_err();
        assert!(matches!(err, WorkerError::LaneFailure(_)));
        assert_eq!(err.exit_code(), skyhook_core::constants::exit_codes::LANE_FAILURE);

        let seen = failures.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("died"));
        assert!(acks.lines().is_empty());
    }
}
