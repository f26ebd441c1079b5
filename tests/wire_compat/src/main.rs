fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use chunkup_protocol::messages::{
        CreateUploadRequest, CreateUploadResponse, ListUploadingsResponse, UploadChunkRequest,
        UploadStatusResponse,
    };
    use chunkup_protocol::UploadInfo;

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
    /// the JSON values (order-independent).
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
            "roundtrip mismatch for {name}:\n  endpoint: {fixture}\n  client:   {reserialized}"
        );
        parsed
    }

    // --- Requests ---

    #[test]
    fn fixture_create_upload_request() {
        let req = roundtrip_test::<CreateUploadRequest>("create_upload_request.json");
        assert_eq!(req.file_size, 734_003_200);
    }

    #[test]
    fn fixture_upload_chunk_request() {
        let req = roundtrip_test::<UploadChunkRequest>("upload_chunk_request.json");
        assert_eq!(req.offset, 1_048_576);
        assert!(!req.content.is_empty());
    }

    // --- Responses ---

    #[test]
    fn fixture_create_upload_response() {
        roundtrip_test::<CreateUploadResponse>("create_upload_response.json");
    }

    #[test]
    fn fixture_upload_status_response() {
        let resp = roundtrip_test::<UploadStatusResponse>("upload_status_response.json");
        assert!(resp.uploaded < resp.file_size);
    }

    #[test]
    fn fixture_list_uploadings_response() {
        let resp = roundtrip_test::<ListUploadingsResponse>("list_uploadings_response.json");
        assert_eq!(resp.upload_infos.len(), 2);
        assert_eq!(resp.upload_infos[1].real_file_path, "notes/todo.md");
    }

    #[test]
    fn fixture_upload_info() {
        let info = roundtrip_test::<UploadInfo>("upload_info.json");
        assert!(!info.is_complete());
    }

    // --- Tolerance ---

    #[test]
    fn list_without_infos_is_empty() {
        let resp: ListUploadingsResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.upload_infos.is_empty());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{"path":"a.bin","uploaded":3,"fileSize":9,"etag":"x"}"#;
        let resp: UploadStatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.uploaded, 3);
    }
}
