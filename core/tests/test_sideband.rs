// Sideband RPC: request framing, `skjson` response lines and dispatch
// onto an operator.

mod common;

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Value};

    use skyhook_core::codec;
    use skyhook_core::collaborator::Collaborator;
    use skyhook_core::operator::{ApplyOperator, ApplyOutcome, Operator, OperatorContext, RequestId, Task};
    use skyhook_core::protocol::{serve, MetaPacket, SidebandRequest, SidebandWriter};
    use skyhook_core::types::{Result, WorkerError};

    use crate::common::{raw_inputs, MemoryCollaborator, SharedBuf};

    fn request(buf: &mut Vec<u8>, id: u64, name: &str, params: Option<Value>) {
        let mut req = json!({"RequestID": id, "Name": name});
        if let Some(p) = params {
            req["JSON"] = Value::String(p.to_string());
        }
        codec::write_frame(buf, &req).unwrap();
    }

    fn context() -> OperatorContext {
        let collaborator: Arc<dyn Collaborator> = Arc::new(MemoryCollaborator::new());
        OperatorContext::new(MetaPacket::from_types(&[], &[]), collaborator)
    }

    /// Records applied keys; defers every odd request id.
    struct Recorder {
        applied: Arc<Mutex<Vec<String>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl Operator for Recorder {
        fn parallelism(&self) -> usize {
            3
        }

        fn apply(&mut self, request_id: RequestId, task: Task) -> Result<ApplyOutcome> {
            self.applied.lock().unwrap().push(task.key);
            Ok(if request_id % 2 == 1 { ApplyOutcome::Deferred } else { ApplyOutcome::Completed })
        }

        fn close(&mut self) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    #[test]
    fn request_json_is_an_encoded_string() {
        let req: SidebandRequest = serde_json::from_value(json!({
            "RequestID": 9,
            "Name": "apply",
            "JSON": "{\"Key\":\"a\",\"Items\":{}}",
        }))
        .unwrap();
        let task: Task = req.params().unwrap();
        assert_eq!(task.key, "a");
    }

    #[test]
    fn missing_params_are_a_violation() {
        for json in [json!({"RequestID": 1, "Name": "get_tasks"}), json!({"RequestID": 1, "Name": "get_tasks", "JSON": ""})] {
            let req: SidebandRequest = serde_json::from_value(json).unwrap();
            assert!(matches!(req.params::<Value>(), Err(WorkerError::ProtocolViolation(_))));
        }
    }

    #[test]
    fn responses_are_prefixed_lines() {
        let out = SharedBuf::default();
        let writer = SidebandWriter::new(out.clone());
        writer.reply(4, &2usize).unwrap();
        writer.ack(5).unwrap();

        assert_eq!(out.lines(), vec![r#"skjson{"RequestID":4,"JSON":"2"}"#, r#"skjson{"RequestID":5}"#]);
    }

    #[test]
    fn serve_dispatches_all_request_kinds() {
        let mut input = Vec::new();
        request(&mut input, 1, "parallelism", None);
        request(&mut input, 2, "get_tasks", Some(serde_json::to_value(raw_inputs(&[&["x", "y"]])).unwrap()));
        request(&mut input, 4, "apply", Some(json!({"Key": "x", "Items": {"inputs": [[{"Key": "x"}]]}})));
        request(&mut input, 5, "apply", Some(json!({"Key": "y", "Items": {"inputs": [[{"Key": "y"}]]}})));

        let applied = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(false));
        let mut op = Recorder { applied: Arc::clone(&applied), closed: Arc::clone(&closed) };

        let out = SharedBuf::default();
        let served = serve(&mut Cursor::new(input), &mut op, &SidebandWriter::new(out.clone())).unwrap();
        assert_eq!(served, 4);

        let responses = out.responses();
        // Deferred apply (id 5) is not acknowledged by the RPC layer.
        assert_eq!(out.acked_ids(), vec![1, 2, 4]);
        assert_eq!(responses[0]["JSON"], "3");

        let tasks: Vec<Task> = serde_json::from_str(responses[1]["JSON"].as_str().unwrap()).unwrap();
        assert_eq!(tasks.iter().map(|t| t.key.as_str()).collect::<Vec<_>>(), vec!["x", "y"]);
        assert!(responses[2].get("JSON").is_none());

        assert_eq!(*applied.lock().unwrap(), vec!["x".to_string(), "y".to_string()]);
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn apply_operator_runs_function_and_acks() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let mut op = ApplyOperator::new(context(), move |_ctx, task| {
            assert_eq!(task.key, "z");
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        let mut input = Vec::new();
        request(&mut input, 7, "apply", Some(json!({"Key": "z", "Items": {}})));
        let out = SharedBuf::default();
        serve(&mut Cursor::new(input), &mut op, &SidebandWriter::new(out.clone())).unwrap();

        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(out.acked_ids(), vec![7]);
    }

    #[test]
    fn truncated_request_fails_serve() {
        let mut input = Vec::new();
        request(&mut input, 1, "parallelism", None);
        input.truncate(input.len() - 1);

        let out = SharedBuf::default();
        let mut op = ApplyOperator::new(context(), |_, _| Ok(()));
        let err = serve(&mut Cursor::new(input), &mut op, &SidebandWriter::new(out.clone())).unwrap_err();
        assert!(matches!(err, WorkerError::Codec(_)));
        assert!(out.lines().is_empty());
    }
}
