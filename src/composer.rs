//! Create-order workflow around an [`OrderDraft`].
//!
//! Holds the draft between UI events, performs the network side effects of
//! selecting a customer and submitting, and guards against double submission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::AdminApi;
use crate::draft::{DraftAction, DraftError, OrderDraft, Totals, ValidationError};
use crate::model::Customer;
use crate::session::{ApiError, SessionStore, Transport};

/// Shown when the backend gives no reason of its own.
pub const GENERIC_FAILURE: &str = "Failed to create order";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("an order submission is already in progress")]
    AlreadySubmitting,
    /// The backend answered, but not with 201 Created.
    #[error("order not created (status {status})")]
    Rejected {
        status: u16,
        message: Option<String>,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SubmitError {
    /// Text for the user: the backend's own message when it sent one.
    pub fn user_message(&self) -> String {
        let backend = match self {
            SubmitError::Validation(e) => return e.to_string(),
            SubmitError::AlreadySubmitting => return self.to_string(),
            SubmitError::Rejected { message, .. } => message.as_deref(),
            SubmitError::Api(e) => e.message(),
        };
        backend.unwrap_or(GENERIC_FAILURE).to_string()
    }
}

/// What the backend returned for a created order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubmitReceipt {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Clears the submitting flag however the submission ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct OrderComposer<T, S> {
    api: AdminApi<T, S>,
    draft: Mutex<OrderDraft>,
    submitting: AtomicBool,
}

impl<T: Transport, S: SessionStore> OrderComposer<T, S> {
    pub fn new(api: AdminApi<T, S>) -> Self {
        Self {
            api,
            draft: Mutex::new(OrderDraft::new()),
            submitting: AtomicBool::new(false),
        }
    }

    pub fn api(&self) -> &AdminApi<T, S> {
        &self.api
    }

    pub fn dispatch(&self, action: DraftAction) -> Result<(), DraftError> {
        self.draft().apply(action)
    }

    /// Copy of the current draft, for rendering.
    pub fn snapshot(&self) -> OrderDraft {
        self.draft().clone()
    }

    pub fn totals(&self) -> Totals {
        self.draft().totals()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.draft().validate()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Start a new draft for `customer` and load its address and catalog.
    ///
    /// If another customer was selected meanwhile, or the catalog prices a
    /// dress below zero, the loaded context is dropped.
    pub async fn select_customer(&self, customer: Customer) -> Result<(), ApiError> {
        let id = customer.id.clone();
        let _ = self.dispatch(DraftAction::SelectCustomer(customer));

        let (address, dresses, discounts) = tokio::try_join!(
            self.api.customer_address(&id),
            self.api.dresses(),
            self.api.discounts(),
        )?;

        match self.dispatch(DraftAction::LoadContext {
            customer: id,
            address,
            dresses,
            discounts,
        }) {
            Err(DraftError::StaleContext { .. }) => {
                info!("customer changed while loading, context dropped")
            }
            Err(e) => warn!(error = %e, "catalog rejected"),
            Ok(()) => {}
        }
        Ok(())
    }

    /// Validate and send the draft.
    ///
    /// Only 201 Created counts as success and resets the draft; any other
    /// outcome leaves it untouched for another attempt.
    pub async fn submit(&self) -> Result<SubmitReceipt, SubmitError> {
        if self.submitting.swap(true, Ordering::AcqRel) {
            return Err(SubmitError::AlreadySubmitting);
        }
        let _in_flight = InFlight(&self.submitting);

        let submission = self.draft().to_submission()?;
        let dresses = submission.payload.dresses.len();

        let response = self.api.create_order(&submission).await.map_err(|e| {
            warn!(error = %e, "order submission failed");
            e
        })?;

        if response.status != 201 {
            warn!(status = response.status, "order submission not created");
            return Err(SubmitError::Rejected {
                status: response.status,
                message: response.message(),
            });
        }

        let receipt = response.json::<Option<SubmitReceipt>>().unwrap_or_else(|e| {
            warn!(error = %e, "unreadable order receipt");
            None
        });
        let _ = self.dispatch(DraftAction::Reset);
        info!(dresses, "order created");
        Ok(receipt.unwrap_or_default())
    }

    fn draft(&self) -> MutexGuard<'_, OrderDraft> {
        self.draft.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use crate::draft::{Attachment, InstanceId};
    use crate::model::MeasurementField;
    use crate::session::{MemoryStore, RequestBody};
    use crate::testing::{FakeBackend, admin_session, customer, session_client};

    const DRESSES: &str = r#"{"dresses":[
        {"_id":"d1","dressName":"Kurti","dressPrice":500,"dressType":"lined"},
        {"_id":"d2","dressName":"Blouse","dressPrice":500,"dressType":"unlined"}
    ]}"#;
    const DISCOUNTS: &str = r#"{"data":[{"_id":"x10","discountPer":10}]}"#;

    fn backend() -> FakeBackend {
        FakeBackend::new("valid")
            .route("POST", "/users/address", 200, r#"[{"_id":"a1","city":"Pune"}]"#)
            .route("GET", "/users/dress", 200, DRESSES)
            .route("GET", "/users/discounts", 200, DISCOUNTS)
    }

    fn composer(backend: FakeBackend) -> OrderComposer<FakeBackend, MemoryStore> {
        let client = session_client(backend, Some(admin_session("valid")));
        OrderComposer::new(AdminApi::new(client))
    }

    fn complete(composer: &OrderComposer<FakeBackend, MemoryStore>, instance: InstanceId) {
        composer
            .dispatch(DraftAction::SetImage {
                instance,
                image: Some(Attachment::new("front.png", "image/png", vec![1, 2])),
            })
            .unwrap();
        for field in MeasurementField::ALL {
            composer
                .dispatch(DraftAction::SetMeasurement {
                    instance,
                    field,
                    value: "32".into(),
                })
                .unwrap();
        }
    }

    /// Customer c1 with one Kurti and one Blouse, 100 extra, 10% off.
    async fn ready_composer(backend: FakeBackend) -> OrderComposer<FakeBackend, MemoryStore> {
        let composer = composer(backend);
        composer.select_customer(customer("c1")).await.unwrap();
        composer
            .dispatch(DraftAction::IncreaseQuantity("d1".into()))
            .unwrap();
        composer
            .dispatch(DraftAction::IncreaseQuantity("d2".into()))
            .unwrap();
        composer
            .dispatch(DraftAction::SetExtraCharges(Amount::from_units(100)))
            .unwrap();
        composer
            .dispatch(DraftAction::ApplyDiscount(Some("x10".into())))
            .unwrap();
        let instances: Vec<_> = composer
            .snapshot()
            .line_items()
            .iter()
            .map(|i| i.instance_id)
            .collect();
        for instance in instances {
            complete(&composer, instance);
        }
        composer
    }

    #[tokio::test]
    async fn select_customer_loads_context() {
        let composer = composer(backend());
        composer.select_customer(customer("c1")).await.unwrap();

        let draft = composer.snapshot();
        assert_eq!(draft.customer().unwrap().id, "c1");
        assert_eq!(draft.address().unwrap().id, "a1");
        assert_eq!(draft.dresses().len(), 2);
        assert_eq!(draft.discounts().len(), 1);
    }

    #[tokio::test]
    async fn created_order_resets_draft() {
        let backend = backend().route(
            "POST",
            "/users/order",
            201,
            r#"{"data":{"orderID":"ORD-9"},"message":"Order created"}"#,
        );
        let composer = ready_composer(backend).await;
        assert_eq!(composer.totals().after_discount, Amount::from_units(990));

        let receipt = composer.submit().await.unwrap();

        assert_eq!(receipt.message.as_deref(), Some("Order created"));
        assert_eq!(composer.snapshot(), OrderDraft::new());
        assert!(!composer.is_submitting());

        let sent = composer
            .api()
            .session()
            .transport()
            .last_request("/users/order")
            .unwrap();
        let RequestBody::Multipart(parts) = sent.body else {
            panic!("expected multipart body");
        };
        assert_eq!(parts.len(), 3);
    }

    #[tokio::test]
    async fn expired_token_during_submit_is_refreshed_and_replayed() {
        let backend = backend().refresh_grants("fresh").route(
            "POST",
            "/users/order",
            201,
            r#"{"message":"Order created"}"#,
        );
        let composer = ready_composer(backend).await;
        let transport = composer.api().session().transport();
        transport.expire_token();

        let receipt = composer.submit().await.unwrap();

        assert_eq!(receipt.message.as_deref(), Some("Order created"));
        assert_eq!(transport.refresh_calls(), 1);
        let attempts: Vec<_> = transport
            .requests()
            .into_iter()
            .filter(|r| r.path == "/users/order")
            .collect();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].bearer.as_deref(), Some("valid"));
        assert_eq!(attempts[1].bearer.as_deref(), Some("fresh"));
        let RequestBody::Multipart(parts) = &attempts[1].body else {
            panic!("expected multipart body");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(attempts[0].body, attempts[1].body);
        assert_eq!(composer.api().session().store().token().as_deref(), Some("fresh"));
        assert_eq!(composer.snapshot(), OrderDraft::new());
    }

    #[tokio::test]
    async fn catalog_with_negative_price_is_not_loaded() {
        let backend = FakeBackend::new("valid")
            .route("POST", "/users/address", 404, "")
            .route(
                "GET",
                "/users/dress",
                200,
                r#"{"dresses":[{"_id":"d1","dressName":"Kurti","dressPrice":-500}]}"#,
            )
            .route("GET", "/users/discounts", 200, DISCOUNTS);
        let composer = composer(backend);
        composer.select_customer(customer("c1")).await.unwrap();

        assert!(composer.snapshot().dresses().is_empty());
        let _ = composer.dispatch(DraftAction::IncreaseQuantity("d1".into()));
        assert!(!composer.totals().base_total.is_negative());
    }

    #[tokio::test]
    async fn rejected_order_keeps_draft() {
        let backend = backend().route(
            "POST",
            "/users/order",
            400,
            r#"{"message":"Dress out of stock"}"#,
        );
        let composer = ready_composer(backend).await;
        let before = composer.snapshot();

        let err = composer.submit().await.unwrap_err();

        assert_eq!(err.user_message(), "Dress out of stock");
        assert_eq!(composer.snapshot(), before);
        assert!(!composer.is_submitting());
    }

    #[tokio::test]
    async fn success_status_other_than_created_keeps_draft() {
        let backend = backend().route("POST", "/users/order", 200, "");
        let composer = ready_composer(backend).await;
        let before = composer.snapshot();

        let err = composer.submit().await.unwrap_err();

        assert!(matches!(err, SubmitError::Rejected { status: 200, .. }));
        assert_eq!(err.user_message(), GENERIC_FAILURE);
        assert_eq!(composer.snapshot(), before);
    }

    #[tokio::test]
    async fn network_failure_keeps_draft() {
        let composer = ready_composer(backend().timeout("/users/order")).await;
        let before = composer.snapshot();

        let err = composer.submit().await.unwrap_err();

        assert_eq!(err.user_message(), GENERIC_FAILURE);
        assert_eq!(composer.snapshot(), before);
    }

    #[tokio::test]
    async fn invalid_draft_is_not_sent() {
        let composer = composer(backend());
        composer.select_customer(customer("c1")).await.unwrap();
        composer
            .dispatch(DraftAction::IncreaseQuantity("d1".into()))
            .unwrap();

        let err = composer.submit().await.unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Validation(ValidationError::MissingImage { position: 1, .. })
        ));
        assert!(
            composer
                .api()
                .session()
                .transport()
                .last_request("/users/order")
                .is_none()
        );
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_is_refused() {
        let composer = ready_composer(backend()).await;
        composer.submitting.store(true, Ordering::Release);

        let err = composer.submit().await.unwrap_err();

        assert!(matches!(err, SubmitError::AlreadySubmitting));
        // the refused call must not clear the other submission's flag
        assert!(composer.is_submitting());
    }
}
