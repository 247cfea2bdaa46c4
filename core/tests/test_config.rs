// Worker configuration, env overrides, transform registry and exit codes.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use skyhook_core::config::{HandlerKind, OperatorKind, WorkerConfig, WorkerMode};
    use skyhook_core::constants::{env, exit_codes, DEFAULT_LANE_CAP};
    use skyhook_core::pipeline::PipelineProfile;
    use skyhook_core::transform::TransformRegistry;
    use skyhook_core::types::WorkerError;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_single_lane_identity() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.mode, WorkerMode::Job);
        assert_eq!(cfg.handler, HandlerKind::PerFrame);
        assert_eq!(cfg.transform, "identity");
        assert_eq!(cfg.pipeline, PipelineProfile::single_lane());
        assert_eq!(cfg.pipeline.max_open_tasks, 4);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg = WorkerConfig::from_json_str(
            r#"{"mode": "operator", "operator": "pipelined", "pipeline": {"lanes": 3}}"#,
        )
        .unwrap();
        assert_eq!(cfg.mode, WorkerMode::Operator);
        assert_eq!(cfg.operator, OperatorKind::Pipelined);
        assert_eq!(cfg.handler, HandlerKind::PerFrame);
        assert_eq!(cfg.pipeline.lanes, 3);
        assert_eq!(cfg.pipeline.watchdog_interval_ms, 1_000);
    }

    #[test]
    fn zero_lanes_are_rejected() {
        let err = WorkerConfig::from_json_str(r#"{"pipeline": {"lanes": 0}}"#).unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
        assert_eq!(err.exit_code(), exit_codes::CONFIG);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut cfg = WorkerConfig::default();
        cfg.apply_overrides(lookup(&[
            (env::MODE, "operator"),
            (env::TRANSFORM, "invert"),
            (env::LANES, "2"),
        ]))
        .unwrap();

        assert_eq!(cfg.mode, WorkerMode::Operator);
        assert_eq!(cfg.transform, "invert");
        assert_eq!(cfg.pipeline.lanes, 2);
    }

    #[test]
    fn auto_lanes_follow_core_count() {
        let mut cfg = WorkerConfig::default();
        cfg.apply_overrides(lookup(&[(env::LANES, "auto")])).unwrap();
        assert!(cfg.pipeline.lanes >= 1 && cfg.pipeline.lanes <= DEFAULT_LANE_CAP);
    }

    #[test]
    fn bad_overrides_are_config_errors() {
        let mut cfg = WorkerConfig::default();
        assert!(matches!(
            cfg.apply_overrides(lookup(&[(env::MODE, "daemon")])),
            Err(WorkerError::Config(_))
        ));
        assert!(matches!(
            cfg.apply_overrides(lookup(&[(env::LANES, "many")])),
            Err(WorkerError::Config(_))
        ));
    }

    #[test]
    fn dynamic_profile_respects_cap() {
        let profile = PipelineProfile::dynamic(1);
        assert_eq!(profile.lanes, 1);
        assert!(profile.max_open_tasks >= profile.lanes);
        profile.validate().unwrap();
    }

    #[test]
    fn registry_resolves_builtins_only() {
        let registry = TransformRegistry::with_builtins();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["identity", "invert"]);
        assert_eq!(registry.build("invert").unwrap().name(), "invert");

        let err = registry.build("yolo").err().unwrap();
        assert!(matches!(err, WorkerError::UnknownTransform(_)));
        assert_eq!(err.exit_code(), exit_codes::CONFIG);
    }
}
