//! Typed calls to the admin backend.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::draft::OrderSubmission;
use crate::model::{
    Address, Customer, CustomerId, Discount, Dress, OrderDetail, OrderStatus, OrderSummary,
    OrderUpdate,
};
use crate::session::{
    ApiError, ApiRequest, ApiResponse, FormPart, SessionClient, SessionStore, Transport,
};

/// Shortest customer search the backend is asked for.
pub const MIN_SEARCH_LEN: usize = 3;

#[derive(Deserialize)]
#[serde(untagged)]
enum CustomerList {
    Bare(Vec<Customer>),
    Wrapped { users: Vec<Customer> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderList {
    Bare(Vec<OrderSummary>),
    Wrapped { data: Vec<OrderSummary> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderBody {
    Bare(Box<OrderDetail>),
    Wrapped { data: Box<OrderDetail> },
}

#[derive(Deserialize)]
struct DressList {
    dresses: Vec<Dress>,
}

#[derive(Deserialize)]
struct DiscountList {
    data: Vec<Discount>,
}

fn decode<T: DeserializeOwned>(response: &ApiResponse) -> Result<T, ApiError> {
    Ok(response.json()?)
}

/// Admin endpoints over an authenticated [`SessionClient`].
pub struct AdminApi<T, S> {
    client: SessionClient<T, S>,
}

impl<T, S> Clone for AdminApi<T, S> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<T: Transport, S: SessionStore> AdminApi<T, S> {
    pub fn new(client: SessionClient<T, S>) -> Self {
        Self { client }
    }

    pub fn session(&self) -> &SessionClient<T, S> {
        &self.client
    }

    /// Customers whose mobile matches `query`. Short queries match nothing.
    pub async fn search_customers(&self, query: &str) -> Result<Vec<Customer>, ApiError> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LEN {
            return Ok(Vec::new());
        }

        let request = ApiRequest::get("/users/search").query("mobile", query);
        let response = self.client.send(request).await?;
        let customers = match decode::<CustomerList>(&response)? {
            CustomerList::Bare(users) | CustomerList::Wrapped { users } => users,
        };
        debug!(query, found = customers.len(), "customer search");
        Ok(customers)
    }

    /// The customer's primary address; `None` when none is on file.
    pub async fn customer_address(
        &self,
        customer: &CustomerId,
    ) -> Result<Option<Address>, ApiError> {
        let request = ApiRequest::post("/users/address").json(&json!({ "userId": customer }))?;
        match self.client.send(request).await {
            Ok(response) => {
                let addresses: Option<Vec<Address>> = decode(&response)?;
                Ok(addresses.and_then(|list| list.into_iter().next()))
            }
            Err(ApiError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn dresses(&self) -> Result<Vec<Dress>, ApiError> {
        let response = self.client.send(ApiRequest::get("/users/dress")).await?;
        Ok(decode::<DressList>(&response)?.dresses)
    }

    pub async fn discounts(&self) -> Result<Vec<Discount>, ApiError> {
        let response = self.client.send(ApiRequest::get("/users/discounts")).await?;
        Ok(decode::<DiscountList>(&response)?.data)
    }

    /// Post the order as multipart: `orderData` JSON plus one `dressImages`
    /// file per dress, in dress order.
    pub async fn create_order(&self, order: &OrderSubmission) -> Result<ApiResponse, ApiError> {
        let mut parts = Vec::with_capacity(order.images.len() + 1);
        parts.push(FormPart::Text {
            name: "orderData".into(),
            value: serde_json::to_string(&order.payload)?,
        });
        parts.extend(order.images.iter().map(|image| FormPart::File {
            name: "dressImages".into(),
            file: image.clone(),
        }));

        let request = ApiRequest::post("/users/order").multipart(parts);
        self.client.send(request).await
    }

    pub async fn orders_by_status(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<OrderSummary>, ApiError> {
        let path = format!("/users/order/status/{status}");
        let response = self.client.send(ApiRequest::get(path)).await?;
        Ok(match decode::<OrderList>(&response)? {
            OrderList::Bare(orders) | OrderList::Wrapped { data: orders } => orders,
        })
    }

    pub async fn order(&self, order_id: &str) -> Result<OrderDetail, ApiError> {
        let path = format!("/users/order/{order_id}");
        let response = self.client.send(ApiRequest::get(path)).await?;
        Ok(match decode::<OrderBody>(&response)? {
            OrderBody::Bare(order) | OrderBody::Wrapped { data: order } => *order,
        })
    }

    pub async fn update_order(&self, order_id: &str, update: &OrderUpdate) -> Result<(), ApiError> {
        let request = ApiRequest::patch(format!("/users/order/{order_id}")).json(update)?;
        self.client.send(request).await?;
        Ok(())
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<(), ApiError> {
        self.update_order(order_id, &OrderUpdate::status(OrderStatus::Cancelled))
            .await
    }

    pub async fn complete_order(&self, order_id: &str) -> Result<(), ApiError> {
        self.update_order(order_id, &OrderUpdate::status(OrderStatus::Completed))
            .await
    }
}
