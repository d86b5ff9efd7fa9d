//! Key ring controller tests against in-memory collaborators

use async_trait::async_trait;
use kms_keyring::credentials::StaticToken;
use kms_keyring::error::KmsOperation;
use kms_keyring::keyprotect::KeyProtectClient;
use kms_keyring::metadata::ResourceControllerClient;
use kms_keyring::{
    EndpointPreference, Extensions, InstanceMetadata, InstanceMetadataFetcher, KeyRingApi,
    KeyRingController, KeyRingError, KeyRingRequest, KeyRingSummary, KmsTarget, MetadataError,
    ReadOutcome, RemoteError, RemoteStatus,
};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

const CRN: &str = "crn:v1:bluemix:public:kms:us-south:a/abc:123::";
const INSTANCE_ID: &str = "123";
const PUBLIC: &str = "https://us-south.kms.cloud.ibm.com";
const PRIVATE: &str = "https://private.us-south.kms.cloud.ibm.com";

#[derive(Default)]
struct FakeInstances {
    instances: Mutex<HashMap<String, InstanceMetadata>>,
    transient: Mutex<bool>,
}

impl FakeInstances {
    fn with(instance_id: &str, crn: &str, extensions: Extensions) -> Self {
        let fake = Self::default();
        fake.add(instance_id, crn, extensions);
        fake
    }

    fn add(&self, instance_id: &str, crn: &str, extensions: Extensions) {
        self.instances.lock().unwrap().insert(
            instance_id.to_string(),
            InstanceMetadata {
                crn: crn.to_string(),
                extensions,
            },
        );
    }

    fn remove(&self, instance_id: &str) {
        self.instances.lock().unwrap().remove(instance_id);
    }
}

#[async_trait]
impl InstanceMetadataFetcher for FakeInstances {
    async fn fetch(&self, instance_id: &str) -> Result<InstanceMetadata, MetadataError> {
        if *self.transient.lock().unwrap() {
            return Err(MetadataError::Transient("service unavailable".to_string()));
        }
        self.instances
            .lock()
            .unwrap()
            .get(instance_id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(instance_id.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Call {
    operation: KmsOperation,
    target: KmsTarget,
}

#[derive(Default)]
struct FakeKms {
    rings: Mutex<HashMap<String, BTreeSet<String>>>,
    calls: Mutex<Vec<Call>>,
    scripted: Mutex<HashMap<String, VecDeque<u16>>>,
    /// Accept creates without storing the ring
    lose_creates: Mutex<bool>,
}

impl FakeKms {
    fn seed(&self, instance_id: &str, key_ring_id: &str) {
        self.rings
            .lock()
            .unwrap()
            .entry(instance_id.to_string())
            .or_default()
            .insert(key_ring_id.to_string());
    }

    fn fail_next(&self, operation: KmsOperation, status: u16) {
        self.scripted
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(status);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn operations(&self) -> Vec<KmsOperation> {
        self.calls().into_iter().map(|c| c.operation).collect()
    }

    fn contains(&self, instance_id: &str, key_ring_id: &str) -> bool {
        self.rings
            .lock()
            .unwrap()
            .get(instance_id)
            .map(|rings| rings.contains(key_ring_id))
            .unwrap_or(false)
    }

    fn begin(
        &self,
        operation: KmsOperation,
        target: &KmsTarget,
        key_ring_id: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(Call {
            operation,
            target: target.clone(),
        });
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&operation.to_string())
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(code) => Err(remote_error(operation, target, key_ring_id, code)),
            None => Ok(()),
        }
    }
}

fn remote_error(
    operation: KmsOperation,
    target: &KmsTarget,
    key_ring_id: Option<&str>,
    code: u16,
) -> RemoteError {
    RemoteError {
        operation,
        status: RemoteStatus::from_status_code(code),
        status_code: Some(code),
        url: target.base_url.clone(),
        instance_id: target.instance_id.clone(),
        key_ring_id: key_ring_id.map(str::to_string),
        message: format!("scripted {code}"),
    }
}

#[async_trait]
impl KeyRingApi for FakeKms {
    async fn prepare_key_ring(&self, target: &KmsTarget, key_ring_id: &str) -> Result<(), RemoteError> {
        self.begin(KmsOperation::Prepare, target, Some(key_ring_id))
    }

    async fn create_key_ring(&self, target: &KmsTarget, key_ring_id: &str) -> Result<(), RemoteError> {
        self.begin(KmsOperation::Create, target, Some(key_ring_id))?;
        if *self.lose_creates.lock().unwrap() {
            return Ok(());
        }
        let mut rings = self.rings.lock().unwrap();
        let instance = rings.entry(target.instance_id.clone()).or_default();
        if !instance.insert(key_ring_id.to_string()) {
            return Err(remote_error(KmsOperation::Create, target, Some(key_ring_id), 409));
        }
        Ok(())
    }

    async fn list_key_rings(&self, target: &KmsTarget) -> Result<Vec<KeyRingSummary>, RemoteError> {
        self.begin(KmsOperation::List, target, None)?;
        Ok(self
            .rings
            .lock()
            .unwrap()
            .get(&target.instance_id)
            .map(|rings| rings.iter().map(KeyRingSummary::new).collect())
            .unwrap_or_default())
    }

    async fn delete_key_ring(&self, target: &KmsTarget, key_ring_id: &str) -> Result<(), RemoteError> {
        self.begin(KmsOperation::Delete, target, Some(key_ring_id))?;
        let removed = self
            .rings
            .lock()
            .unwrap()
            .get_mut(&target.instance_id)
            .map(|rings| rings.remove(key_ring_id))
            .unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(remote_error(KmsOperation::Delete, target, Some(key_ring_id), 404))
        }
    }
}

fn both_endpoints() -> Extensions {
    Extensions::with_endpoints(Some(PUBLIC), Some(PRIVATE))
}

fn setup(extensions: Extensions) -> (Arc<FakeInstances>, Arc<FakeKms>, KeyRingController) {
    let instances = Arc::new(FakeInstances::with(INSTANCE_ID, CRN, extensions));
    let kms = Arc::new(FakeKms::default());
    let controller = KeyRingController::new(instances.clone(), kms.clone());
    (instances, kms, controller)
}

fn external_id(key_ring_id: &str) -> String {
    format!("{key_ring_id}:keyRing:{CRN}")
}

#[tokio::test]
async fn test_create_then_read_end_to_end() {
    let (_, kms, controller) = setup(both_endpoints());

    let request = KeyRingRequest::new(CRN, "finance-keys", None);
    let id = controller.create(&request).await.unwrap();
    assert_eq!(
        id,
        "finance-keys:keyRing:crn:v1:bluemix:public:kms:us-south:a/abc:123::"
    );

    let outcome = controller.read(&id, None).await.unwrap();
    let state = outcome.state().expect("key ring should be present");
    assert_eq!(state.key_ring_id, "finance-keys");
    assert_eq!(state.instance_id, INSTANCE_ID);
    assert_eq!(state.instance_crn, CRN);
    assert_eq!(state.endpoint_preference, EndpointPreference::Private);

    for call in kms.calls() {
        assert_eq!(call.target, KmsTarget::new(PRIVATE, INSTANCE_ID));
    }
}

#[tokio::test]
async fn test_create_accepts_bare_instance_id() {
    let (_, kms, controller) = setup(both_endpoints());

    let request = KeyRingRequest::new(INSTANCE_ID, "ring-a", Some(EndpointPreference::Public));
    let id = controller.create(&request).await.unwrap();

    assert_eq!(id, external_id("ring-a"));
    assert!(kms.contains(INSTANCE_ID, "ring-a"));
    assert_eq!(kms.calls()[0].target, KmsTarget::new(PUBLIC, INSTANCE_ID));
}

#[tokio::test]
async fn test_create_call_sequence() {
    let (_, kms, controller) = setup(both_endpoints());
    controller
        .create(&KeyRingRequest::new(CRN, "ring-a", None))
        .await
        .unwrap();
    assert_eq!(
        kms.operations(),
        [KmsOperation::Prepare, KmsOperation::Create, KmsOperation::List]
    );

    let (_, kms, controller) = setup(both_endpoints());
    let controller = controller.with_prepare_before_create(false);
    controller
        .create(&KeyRingRequest::new(CRN, "ring-a", None))
        .await
        .unwrap();
    assert_eq!(kms.operations(), [KmsOperation::Create, KmsOperation::List]);
}

#[tokio::test]
async fn test_create_fails_verification_when_ring_not_listed() {
    let (_, kms, controller) = setup(both_endpoints());
    *kms.lose_creates.lock().unwrap() = true;

    let err = controller
        .create(&KeyRingRequest::new(CRN, "ghost", None))
        .await
        .unwrap_err();
    match err {
        KeyRingError::VerificationFailed {
            key_ring_id,
            instance_id,
            url,
        } => {
            assert_eq!(key_ring_id, "ghost");
            assert_eq!(instance_id, INSTANCE_ID);
            assert_eq!(url, PRIVATE);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_create_rejects_invalid_input_before_remote_calls() {
    let (_, kms, controller) = setup(both_endpoints());

    for key_ring_id in ["x", "bad:id", "with space"] {
        let err = controller
            .create(&KeyRingRequest::new(CRN, key_ring_id, None))
            .await
            .unwrap_err();
        assert!(matches!(err, KeyRingError::Validation(_)));
    }
    assert!(kms.calls().is_empty());
}

#[tokio::test]
async fn test_create_private_without_private_endpoint() {
    let (_, kms, controller) = setup(Extensions::with_endpoints(Some(PUBLIC), None));

    let err = controller
        .create(&KeyRingRequest::new(
            CRN,
            "ring-a",
            Some(EndpointPreference::Private),
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KeyRingError::EndpointUnavailable {
            requested: EndpointPreference::Private,
            ..
        }
    ));
    assert!(kms.calls().is_empty());
}

#[tokio::test]
async fn test_create_surfaces_remote_failure_with_context() {
    let (_, kms, controller) = setup(both_endpoints());
    kms.fail_next(KmsOperation::Create, 500);

    let err = controller
        .create(&KeyRingRequest::new(CRN, "ring-a", None))
        .await
        .unwrap_err();
    assert_eq!(err.remote_status(), Some(RemoteStatus::Other));
    let text = err.to_string();
    assert!(text.contains(PRIVATE));
    assert!(text.contains(INSTANCE_ID));
    assert!(text.contains("ring-a"));
    // Not retried
    assert_eq!(kms.operations(), [KmsOperation::Prepare, KmsOperation::Create]);
}

#[tokio::test]
async fn test_create_aborts_when_prepare_fails() {
    let (_, kms, controller) = setup(both_endpoints());
    kms.fail_next(KmsOperation::Prepare, 503);

    let err = controller
        .create(&KeyRingRequest::new(CRN, "ring-a", None))
        .await
        .unwrap_err();
    match err {
        KeyRingError::Remote(e) => {
            assert_eq!(e.operation, KmsOperation::Prepare);
            assert_eq!(e.key_ring_id.as_deref(), Some("ring-a"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(kms.operations(), [KmsOperation::Prepare]);
    assert!(!kms.contains(INSTANCE_ID, "ring-a"));
}

#[tokio::test]
async fn test_create_without_kms_token_is_a_credentials_error() {
    let instances = Arc::new(FakeInstances::with(INSTANCE_ID, CRN, both_endpoints()));
    let kms = Arc::new(KeyProtectClient::new(
        reqwest::Client::new(),
        Arc::new(StaticToken::new("")),
    ));
    let controller = KeyRingController::new(instances, kms);

    let err = controller
        .create(&KeyRingRequest::new(CRN, "ring-a", None))
        .await
        .unwrap_err();
    assert!(
        matches!(err, KeyRingError::Credentials(ref message) if message == "access token is empty"),
        "unexpected error: {err}"
    );
    assert_eq!(err.remote_status(), None);
}

#[tokio::test]
async fn test_operations_without_resource_controller_token_are_credentials_errors() {
    // Never contacted: the token check fails first
    let metadata = Arc::new(ResourceControllerClient::new(
        "http://127.0.0.1:9",
        reqwest::Client::new(),
        Arc::new(StaticToken::new("")),
    ));
    let kms = Arc::new(FakeKms::default());
    let controller = KeyRingController::new(metadata, kms.clone());

    let err = controller
        .create(&KeyRingRequest::new(CRN, "ring-a", None))
        .await
        .unwrap_err();
    assert!(matches!(err, KeyRingError::Credentials(_)), "unexpected error: {err}");

    // Not mistaken for a vanished instance
    let err = controller.read(&external_id("ring-a"), None).await.unwrap_err();
    assert!(matches!(err, KeyRingError::Credentials(_)), "unexpected error: {err}");

    let err = controller.delete(&external_id("ring-a"), None).await.unwrap_err();
    assert!(matches!(err, KeyRingError::Credentials(_)), "unexpected error: {err}");

    assert!(kms.calls().is_empty());
}

#[tokio::test]
async fn test_create_existing_ring_is_an_error() {
    let (_, kms, controller) = setup(both_endpoints());
    kms.seed(INSTANCE_ID, "ring-a");

    let err = controller
        .create(&KeyRingRequest::new(CRN, "ring-a", None))
        .await
        .unwrap_err();
    assert_eq!(err.remote_status(), Some(RemoteStatus::Conflict));
}

#[tokio::test]
async fn test_create_fails_when_instance_missing() {
    let (instances, _, controller) = setup(both_endpoints());
    instances.remove(INSTANCE_ID);

    let err = controller
        .create(&KeyRingRequest::new(CRN, "ring-a", None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KeyRingError::MetadataFetch {
            source: MetadataError::NotFound(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_read_malformed_id_is_invalid_state() {
    let (_, kms, controller) = setup(both_endpoints());

    let err = controller.read("bad-id-no-separator", None).await.unwrap_err();
    assert!(matches!(err, KeyRingError::InvalidState { .. }));

    let err = controller.read("ring:keyRing:short", None).await.unwrap_err();
    assert!(matches!(err, KeyRingError::InvalidState { .. }));
    assert!(kms.calls().is_empty());
}

#[tokio::test]
async fn test_read_when_instance_gone_is_absent() {
    let (instances, kms, controller) = setup(both_endpoints());
    kms.seed(INSTANCE_ID, "ring-a");
    instances.remove(INSTANCE_ID);

    let outcome = controller.read(&external_id("ring-a"), None).await.unwrap();
    assert_eq!(outcome, ReadOutcome::Absent);
}

#[tokio::test]
async fn test_read_transient_metadata_failure_is_an_error() {
    let (instances, _, controller) = setup(both_endpoints());
    *instances.transient.lock().unwrap() = true;

    let err = controller.read(&external_id("ring-a"), None).await.unwrap_err();
    assert!(matches!(
        err,
        KeyRingError::MetadataFetch {
            source: MetadataError::Transient(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_read_gone_statuses_are_absent() {
    for code in [404, 409] {
        let (_, kms, controller) = setup(both_endpoints());
        kms.fail_next(KmsOperation::List, code);

        let outcome = controller.read(&external_id("ring-a"), None).await.unwrap();
        assert!(outcome.is_absent(), "status {code} should mean absent");
    }
}

#[tokio::test]
async fn test_read_other_status_is_an_error() {
    let (_, kms, controller) = setup(both_endpoints());
    kms.fail_next(KmsOperation::List, 503);

    let err = controller.read(&external_id("ring-a"), None).await.unwrap_err();
    assert_eq!(err.remote_status(), Some(RemoteStatus::Other));
}

#[tokio::test]
async fn test_read_does_not_check_membership_by_default() {
    let (_, _, controller) = setup(both_endpoints());

    let outcome = controller
        .read(&external_id("deleted-elsewhere"), None)
        .await
        .unwrap();
    assert!(!outcome.is_absent());
}

#[tokio::test]
async fn test_read_membership_check_when_enabled() {
    let (_, kms, controller) = setup(both_endpoints());
    let controller = controller.with_verify_read_membership(true);
    kms.seed(INSTANCE_ID, "kept");

    let outcome = controller
        .read(&external_id("deleted-elsewhere"), None)
        .await
        .unwrap();
    assert!(outcome.is_absent());

    let outcome = controller.read(&external_id("kept"), None).await.unwrap();
    assert!(!outcome.is_absent());
}

#[tokio::test]
async fn test_read_reports_public_endpoint() {
    let (_, kms, controller) = setup(both_endpoints());
    kms.seed(INSTANCE_ID, "ring-a");

    let outcome = controller
        .read(&external_id("ring-a"), Some(EndpointPreference::Public))
        .await
        .unwrap();
    assert_eq!(
        outcome.state().unwrap().endpoint_preference,
        EndpointPreference::Public
    );
}

#[tokio::test]
async fn test_import_picks_endpoint_automatically() {
    let (_, kms, controller) = setup(Extensions::with_endpoints(Some(PUBLIC), None));
    kms.seed(INSTANCE_ID, "ring-a");

    let outcome = controller.import(&external_id("ring-a")).await.unwrap();
    let state = outcome.state().unwrap();
    assert_eq!(state.key_ring_id, "ring-a");
    assert_eq!(state.endpoint_preference, EndpointPreference::Public);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (_, kms, controller) = setup(both_endpoints());
    kms.seed(INSTANCE_ID, "ring-a");
    let id = external_id("ring-a");

    controller.delete(&id, None).await.unwrap();
    assert!(!kms.contains(INSTANCE_ID, "ring-a"));

    // The backend now answers 404
    controller.delete(&id, None).await.unwrap();
    assert_eq!(kms.operations(), [KmsOperation::Delete, KmsOperation::Delete]);
}

#[tokio::test]
async fn test_delete_conflict_is_success() {
    let (_, kms, controller) = setup(both_endpoints());
    kms.seed(INSTANCE_ID, "ring-a");
    kms.fail_next(KmsOperation::Delete, 409);

    controller.delete(&external_id("ring-a"), None).await.unwrap();
}

#[tokio::test]
async fn test_delete_other_failure_is_surfaced() {
    let (_, kms, controller) = setup(both_endpoints());
    kms.seed(INSTANCE_ID, "ring-a");
    kms.fail_next(KmsOperation::Delete, 500);

    let err = controller
        .delete(&external_id("ring-a"), None)
        .await
        .unwrap_err();
    match err {
        KeyRingError::Remote(e) => {
            assert_eq!(e.status_code, Some(500));
            assert_eq!(e.key_ring_id.as_deref(), Some("ring-a"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_delete_malformed_id_is_invalid_state() {
    let (_, kms, controller) = setup(both_endpoints());

    let err = controller.delete("bad-id-no-separator", None).await.unwrap_err();
    assert!(matches!(err, KeyRingError::InvalidState { .. }));
    assert!(kms.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_operations_keep_their_own_targets() {
    const OTHER_CRN: &str = "crn:v1:bluemix:public:kms:eu-de:a/def:456::";
    const OTHER_PUBLIC: &str = "https://eu-de.kms.cloud.ibm.com";

    let (instances, kms, controller) = setup(both_endpoints());
    instances.add(
        "456",
        OTHER_CRN,
        Extensions::with_endpoints(Some(OTHER_PUBLIC), None),
    );
    let controller = Arc::new(controller);

    let first = KeyRingRequest::new(CRN, "ring-a", None);
    let second = KeyRingRequest::new("456", "ring-b", None);
    let (a, b) = tokio::join!(controller.create(&first), controller.create(&second));

    assert_eq!(a.unwrap(), external_id("ring-a"));
    assert_eq!(b.unwrap(), format!("ring-b:keyRing:{OTHER_CRN}"));

    for call in kms.calls() {
        let expected = match call.target.instance_id.as_str() {
            INSTANCE_ID => PRIVATE,
            "456" => OTHER_PUBLIC,
            other => panic!("unexpected instance {other}"),
        };
        assert_eq!(call.target.base_url, expected);
    }
    assert!(kms.contains(INSTANCE_ID, "ring-a"));
    assert!(kms.contains("456", "ring-b"));
    assert!(!kms.contains(INSTANCE_ID, "ring-b"));
}
