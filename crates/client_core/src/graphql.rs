//! GraphQL-over-HTTP client for the booking API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{
        GraphQlRequest, GraphQlResponse, HotelRoomTypesData, RoomTypePage, RoomTypesQuery,
        SaveHotelReservationData, SaveHotelReservationPayload, SaveHotelReservationVariables,
    },
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{CatalogApi, ReservationApi};

pub const HOTEL_ROOM_TYPES_OPERATION: &str = "HotelRoomTypes";
pub const HOTEL_ROOM_TYPES_QUERY: &str = r#"
query HotelRoomTypes($page: Int, $take: Int, $filter: HotelRoomTypeFilterInput, $orderBy: HotelRoomTypeOrderInput) {
    hotelRoomTypes(page: $page, take: $take, filter: $filter, orderBy: $orderBy) {
        count
        hotelRoomTypes {
            id
            hotelId
            roomType {
                name
            }
        }
    }
}
"#;

pub const SAVE_HOTEL_RESERVATION_OPERATION: &str = "SaveHotelReservation";
pub const SAVE_HOTEL_RESERVATION_MUTATION: &str = r#"
mutation SaveHotelReservation($id: Int, $hotelId: Int, $userId: Int, $hotelRoomTypeId: Int, $startDate: String, $endDate: String, $nbPersons: Int) {
    saveHotelReservation(id: $id, hotelId: $hotelId, userId: $userId, hotelRoomTypeId: $hotelRoomTypeId, startDate: $startDate, endDate: $endDate, nbPersons: $nbPersons) {
        __typename
        ... on InputError {
            message
        }
        ... on HotelReservation {
            id
            hotelId
            userId
            hotelRoomTypeId
            startDate
            endDate
            nbPersons
        }
    }
}
"#;

#[derive(Debug, Error)]
pub enum GraphQlError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} returned HTTP {status}")]
    Status {
        operation: &'static str,
        status: StatusCode,
    },
    #[error("{operation} returned a malformed response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{operation} failed: {}", join_messages(.errors))]
    Errors {
        operation: &'static str,
        errors: Vec<ApiError>,
    },
    #[error("{operation} response carried no data")]
    MissingData { operation: &'static str },
}

impl GraphQlError {
    /// Code of the first error the server reported, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Errors { errors, .. } => errors.first().map(ApiError::code),
            _ => None,
        }
    }
}

fn join_messages(errors: &[ApiError]) -> String {
    errors
        .iter()
        .map(|err| err.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Clone)]
pub struct GraphQlClient {
    http: Client,
    endpoint: Url,
    token: Option<String>,
}

impl GraphQlClient {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            token: None,
        }
    }

    pub fn with_timeout(endpoint: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            endpoint,
            token: None,
        })
    }

    /// Bearer token sent with every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn execute<V, T>(
        &self,
        operation: &'static str,
        query: &str,
        variables: &V,
    ) -> Result<T, GraphQlError>
    where
        V: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = GraphQlRequest {
            query: query.to_string(),
            operation_name: operation.to_string(),
            variables,
        };

        let mut request = self.http.post(self.endpoint.clone()).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        debug!("graphql: sending operation={operation} endpoint={}", self.endpoint);
        let response = request.send().await.map_err(|source| GraphQlError::Request {
            endpoint: self.endpoint.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GraphQlError::Status { operation, status });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| GraphQlError::Request {
                endpoint: self.endpoint.to_string(),
                source,
            })?;
        let envelope: GraphQlResponse<serde_json::Value> = serde_json::from_slice(&bytes)
            .map_err(|source| GraphQlError::Decode { operation, source })?;

        if !envelope.errors.is_empty() {
            warn!(
                "graphql: operation={operation} returned {} error(s)",
                envelope.errors.len()
            );
            return Err(GraphQlError::Errors {
                operation,
                errors: envelope.errors,
            });
        }

        match envelope.data {
            None | Some(serde_json::Value::Null) => Err(GraphQlError::MissingData { operation }),
            Some(data) => serde_json::from_value(data)
                .map_err(|source| GraphQlError::Decode { operation, source }),
        }
    }
}

#[async_trait]
impl CatalogApi for GraphQlClient {
    async fn list_room_types(&self, query: RoomTypesQuery) -> Result<RoomTypePage> {
        let data: HotelRoomTypesData = self
            .execute(HOTEL_ROOM_TYPES_OPERATION, HOTEL_ROOM_TYPES_QUERY, &query)
            .await?;
        Ok(data.hotel_room_types)
    }
}

#[async_trait]
impl ReservationApi for GraphQlClient {
    async fn save_reservation(
        &self,
        variables: SaveHotelReservationVariables,
    ) -> Result<SaveHotelReservationPayload> {
        let data: SaveHotelReservationData = self
            .execute(
                SAVE_HOTEL_RESERVATION_OPERATION,
                SAVE_HOTEL_RESERVATION_MUTATION,
                &variables,
            )
            .await?;
        Ok(data.save_hotel_reservation)
    }
}

#[cfg(test)]
#[path = "tests/graphql_tests.rs"]
mod tests;
