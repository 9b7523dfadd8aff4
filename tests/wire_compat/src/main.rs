fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use shiplio_protocol::constants::{build_topic, events, runtime_topic};
    use shiplio_protocol::{
        BuildComplete, Frame, LogEvent, LogLevel, ReplyStatus, RuntimeLog,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values. Returns the parsed value for further checks.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  broker: {fixture}\n  client: {reserialized}"
        );
        parsed
    }

    // --- Frames ---

    #[test]
    fn fixture_join_build_topic() {
        let frame: Frame = roundtrip_test("join_build.json");
        assert_eq!(frame, Frame::join("3", build_topic("8f14e45f"), serde_json::json!({})));
    }

    #[test]
    fn fixture_join_runtime_topic() {
        let frame: Frame = roundtrip_test("join_runtime.json");
        assert_eq!(frame.topic, runtime_topic("8f14e45f"));
        assert_eq!(frame.payload["tail"], 50);
        assert_eq!(frame.join_ref, frame.reference);
    }

    #[test]
    fn fixture_reply_ok() {
        let frame: Frame = roundtrip_test("reply_ok.json");
        assert!(frame.is_reply());
        let reply = frame.parse_reply().unwrap();
        assert_eq!(reply.status, ReplyStatus::Ok);
    }

    #[test]
    fn fixture_reply_error() {
        let frame: Frame = roundtrip_test("reply_error.json");
        let reply = frame.parse_reply().unwrap();
        assert_eq!(reply.status, ReplyStatus::Error);
        assert_eq!(reply.reason(), "unauthorized");
    }

    #[test]
    fn fixture_heartbeat() {
        let frame: Frame = roundtrip_test("heartbeat.json");
        assert_eq!(frame, Frame::heartbeat("7"));
        assert_eq!(frame.join_ref, None);
    }

    #[test]
    fn fixture_leave() {
        let frame: Frame = roundtrip_test("leave.json");
        assert_eq!(frame, Frame::leave("3", "9", "logs:8f14e45f"));
    }

    #[test]
    fn fixture_push_new_log() {
        let frame: Frame = roundtrip_test("push_new_log.json");
        assert_eq!(frame.event, events::NEW_LOG);
        assert_eq!(frame.reference, None);

        let event: LogEvent = serde_json::from_value(frame.payload).unwrap();
        assert_eq!(event.level, LogLevel::Info);
        assert_eq!(event.step.as_deref(), Some("install"));
        assert!(!event.is_terminal());
    }

    #[test]
    fn client_encoding_matches_broker_layout() {
        let text = Frame::join("1", "logs:p", serde_json::json!({"tail": 10}))
            .encode()
            .unwrap();
        assert_eq!(text, r#"["1","1","logs:p","phx_join",{"tail":10}]"#);
    }

    // --- Payloads ---

    #[test]
    fn fixture_new_log_done() {
        let event: LogEvent = roundtrip_test("new_log_done.json");
        assert!(event.is_terminal());
        assert_eq!(event.level, LogLevel::Success);
    }

    #[test]
    fn fixture_build_complete() {
        let done: BuildComplete = roundtrip_test("build_complete.json");
        assert_eq!(done.url, "https://shop.shiplio.app");
        assert_eq!(done.duration, 42_180);
    }

    #[test]
    fn fixture_runtime_log() {
        let log: RuntimeLog = roundtrip_test("runtime_log.json");
        assert_eq!(log.timestamp.as_deref(), Some("2026-03-01 10:22:00.125"));
    }

    #[test]
    fn broker_level_aliases_decode() {
        let event: LogEvent =
            serde_json::from_value(serde_json::json!({"level": "warning", "message": "x"}))
                .unwrap();
        assert_eq!(event.level, LogLevel::Warn);

        let event: LogEvent =
            serde_json::from_value(serde_json::json!({"level": "debug", "message": "x"})).unwrap();
        assert_eq!(event.level, LogLevel::Unknown);
    }
}
