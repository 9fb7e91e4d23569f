// Read-only commands: contract state queries, code id lookup and artifact verification
mod common;

use serde_json::json;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, ResponseTemplate};

use contract_deployer::cli::ArtifactArgs;
use contract_deployer::commands::{query_code_id, query_contract_info, query_output, verify_artifact};
use contract_deployer::error::exit_code;
use contract_deployer::{Checksum, ErrorKind, Network, StateVerifier};

use common::*;

const PROVER_WASM: &[u8] = b"\0asm\x01\0\0\0multisig-prover 1.1.0";

#[tokio::test]
async fn test_contract_info_reports_slug_and_version() {
    let deployer = TestDeployer::start("contract_info").await;
    deployer.mount_contract_info("multisig", "2.0.0").await;

    let info = query_contract_info(&deployer.session, "Multisig", None, None)
        .await
        .unwrap();
    assert_eq!(serde_json::to_value(&info).unwrap(), json!({ "contract": "multisig", "version": "2.0.0" }));

    let matched = query_contract_info(&deployer.session, "multisig", None, Some("2.0.0")).await;
    assert!(matched.is_ok());

    let err = query_contract_info(&deployer.session, "Multisig", None, Some("2.1.0"))
        .await
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::QueryError(_)));
    assert_eq!(err.exit_code(), exit_code::QUERY);
}

#[tokio::test]
async fn test_contract_info_without_address_is_missing_address() {
    let deployer = TestDeployer::start("contract_info_missing").await;

    let err = query_contract_info(&deployer.session, "Coordinator", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MissingAddress(_)));
    assert_eq!(err.exit_code(), exit_code::REQUEST);
}

#[tokio::test]
async fn test_invalid_base64_is_decode_error() {
    let deployer = TestDeployer::start("raw_invalid_base64").await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/cosmwasm/wasm/v1/contract/axelar1[0-9a-z]+/raw/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": "%%%not-base64%%%" })))
        .mount(&deployer.lcd)
        .await;

    let err = query_contract_info(&deployer.session, "Multisig", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DecodeError(_)));
    assert_eq!(err.exit_code(), exit_code::QUERY);
}

#[tokio::test]
async fn test_node_rejection_is_query_error() {
    let deployer = TestDeployer::start("raw_rejected").await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/cosmwasm/wasm/v1/contract/.+$"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "code": 2,
            "message": "contract: not found"
        })))
        .mount(&deployer.lcd)
        .await;

    let err = query_contract_info(&deployer.session, "Multisig", None, None)
        .await
        .unwrap_err();
    match &err.kind {
        ErrorKind::QueryError(message) => assert!(message.contains("contract: not found")),
        other => panic!("expected query error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_smart_query_output() {
    let deployer = TestDeployer::start("smart_query").await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/cosmwasm/wasm/v1/contract/axelar1[0-9a-z]+/smart/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "signing_threshold": "2/3", "block_expiry": 10 }
        })))
        .mount(&deployer.lcd)
        .await;

    let verifier = StateVerifier::new(deployer.session.client.clone());
    let result = verifier
        .query_smart(&multisig_address(), r#"{"config":{}}"#)
        .await
        .unwrap();

    assert_eq!(query_output(&result)["block_expiry"], 10);
}

#[tokio::test]
async fn test_smart_query_string_answer_is_kept_verbatim() {
    let deployer = TestDeployer::start("smart_query_string").await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/cosmwasm/wasm/v1/contract/axelar1[0-9a-z]+/smart/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": governance_address() })))
        .mount(&deployer.lcd)
        .await;

    let verifier = StateVerifier::new(deployer.session.client.clone());
    let result = verifier
        .query_smart(&multisig_address(), r#"{"governance_address":{}}"#)
        .await
        .unwrap();

    assert_eq!(query_output(&result), json!(governance_address()));
}

#[tokio::test]
async fn test_code_id_lookup_matches_artifact_checksum() {
    let deployer = TestDeployer::start("code_id_lookup").await;
    deployer
        .publish(
            "multisig-prover",
            "1.1.0",
            PROVER_WASM,
            &manifest_line(PROVER_WASM, "multisig_prover.wasm"),
        )
        .await;

    let checksum = Checksum::of_bytes(PROVER_WASM);
    Mock::given(method("GET"))
        .and(path("/cosmwasm/wasm/v1/code"))
        .and(query_param("pagination.reverse", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code_infos": [
                { "code_id": "45", "creator": governance_address(), "data_hash": "AB".repeat(32) },
                { "code_id": "44", "creator": governance_address(), "data_hash": checksum.as_str().to_uppercase() }
            ],
            "pagination": { "next_key": null, "total": "0" }
        })))
        .expect(1)
        .mount(&deployer.lcd)
        .await;

    let args = ArtifactArgs {
        contract: "MultisigProver".to_string(),
        version: Some("v1.1.0".to_string()),
        artifact: None,
    };
    let found = query_code_id(&deployer.session, &args).await.unwrap();

    assert_eq!(found["codeId"], 44);
    assert_eq!(found["checksum"], checksum.as_str());
}

#[tokio::test]
async fn test_code_id_lookup_without_match_is_query_error() {
    let deployer = TestDeployer::start("code_id_no_match").await;
    deployer
        .publish(
            "multisig-prover",
            "1.1.0",
            PROVER_WASM,
            &manifest_line(PROVER_WASM, "multisig_prover.wasm"),
        )
        .await;
    Mock::given(method("GET"))
        .and(path("/cosmwasm/wasm/v1/code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code_infos": [] })))
        .mount(&deployer.lcd)
        .await;

    let args = ArtifactArgs {
        contract: "MultisigProver".to_string(),
        version: Some("1.1.0".to_string()),
        artifact: None,
    };
    let err = query_code_id(&deployer.session, &args).await.unwrap_err();
    assert!(matches!(err.kind, ErrorKind::QueryError(_)));
}

#[tokio::test]
async fn test_verify_local_artifact_with_manifest_beside_it() {
    let dir = tempfile::tempdir().unwrap();
    let binary = dir.path().join("multisig_prover.wasm");
    std::fs::write(&binary, PROVER_WASM).unwrap();
    std::fs::write(
        dir.path().join("checksums.txt"),
        format!(
            "# release 1.1.0\n{}{} *multisig_prover.wasm\n",
            manifest_line(b"other", "coordinator.wasm"),
            Checksum::of_bytes(PROVER_WASM).as_str().to_uppercase(),
        ),
    )
    .unwrap();

    let config = test_config(dir.path(), "http://127.0.0.1:9", "DEPLOYER_TEST_VERIFY_LOCAL_");
    let args = ArtifactArgs {
        contract: "MultisigProver".to_string(),
        version: None,
        artifact: Some(binary),
    };

    let report = verify_artifact(&config, Network::Testnet, &args).await.unwrap();
    assert_eq!(report.stage, "checksum-verified");
    assert_eq!(report.checksum, Some(Checksum::of_bytes(PROVER_WASM)));
}

#[tokio::test]
async fn test_local_artifact_without_manifest_or_version_is_fetch_error() {
    let dir = tempfile::tempdir().unwrap();
    let binary = dir.path().join("multisig_prover.wasm");
    std::fs::write(&binary, PROVER_WASM).unwrap();

    let config = test_config(dir.path(), "http://127.0.0.1:9", "DEPLOYER_TEST_NO_MANIFEST_");
    let args = ArtifactArgs {
        contract: "MultisigProver".to_string(),
        version: None,
        artifact: Some(binary),
    };

    let err = verify_artifact(&config, Network::Testnet, &args).await.unwrap_err();
    assert!(matches!(err.kind, ErrorKind::FetchError { .. }));
    assert_eq!(err.exit_code(), exit_code::FETCH);
}
