use super::*;

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use chrono::NaiveDate;
use serde_json::{json, Value};
use shared::{
    domain::{HotelId, RoomTypeId, UserId},
    error::ErrorCode,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone)]
struct RecordedRequest {
    authorization: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct GraphQlServerState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    status: StatusCode,
    response: Value,
}

async fn handle_graphql(
    State(state): State<GraphQlServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state
        .requests
        .lock()
        .await
        .push(RecordedRequest {
            authorization,
            body,
        });
    (state.status, Json(state.response.clone()))
}

async fn spawn_graphql_server(
    status: StatusCode,
    response: Value,
) -> anyhow::Result<(Url, Arc<Mutex<Vec<RecordedRequest>>>)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = GraphQlServerState {
        requests: requests.clone(),
        status,
        response,
    };
    let app = Router::new()
        .route("/graphql", post(handle_graphql))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((Url::parse(&format!("http://{addr}/graphql"))?, requests))
}

fn sample_variables() -> SaveHotelReservationVariables {
    SaveHotelReservationVariables {
        id: None,
        hotel_id: HotelId::new("3"),
        user_id: UserId::new("5"),
        hotel_room_type_id: Some(RoomTypeId::new("12")),
        start_date: NaiveDate::from_ymd_opt(2024, 6, 1),
        end_date: NaiveDate::from_ymd_opt(2024, 6, 5),
        nb_persons: 2,
    }
}

#[tokio::test]
async fn list_room_types_posts_named_query_and_decodes_items() {
    let (endpoint, requests) = spawn_graphql_server(
        StatusCode::OK,
        json!({
            "data": {
                "hotelRoomTypes": {
                    "count": 2,
                    "hotelRoomTypes": [
                        {"id": 1, "hotelId": 3, "roomType": {"name": "suite"}},
                        {"id": "rt2", "roomType": {"name": "double"}}
                    ]
                }
            }
        }),
    )
    .await
    .expect("spawn server");

    let client = GraphQlClient::new(endpoint);
    let page = client
        .list_room_types(RoomTypesQuery::default())
        .await
        .expect("room types");

    assert_eq!(page.count, 2);
    let ids = page
        .items
        .iter()
        .map(|item| item.id.clone())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![RoomTypeId::new("1"), RoomTypeId::new("rt2")]);
    assert_eq!(page.items[0].hotel_id, Some(HotelId::new("3")));
    assert_eq!(page.items[1].room_type.name, "double");

    let requests = requests.lock().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.authorization, None);
    assert_eq!(request.body["operationName"], "HotelRoomTypes");
    assert!(request.body["query"]
        .as_str()
        .expect("query text")
        .contains("hotelRoomTypes("));
    assert_eq!(
        request.body["variables"],
        json!({"page": null, "take": null, "filter": null, "orderBy": null})
    );
}

#[tokio::test]
async fn save_reservation_sends_variables_and_bearer_token() {
    let (endpoint, requests) = spawn_graphql_server(
        StatusCode::OK,
        json!({
            "data": {
                "saveHotelReservation": {
                    "__typename": "HotelReservation",
                    "id": 41,
                    "hotelId": 3,
                    "userId": 5,
                    "hotelRoomTypeId": 12,
                    "startDate": "2024-06-01",
                    "endDate": "2024-06-05",
                    "nbPersons": 2
                }
            }
        }),
    )
    .await
    .expect("spawn server");

    let client = GraphQlClient::new(endpoint).with_token(Some("jwt-token".to_string()));
    let payload = client
        .save_reservation(sample_variables())
        .await
        .expect("save");

    match payload {
        SaveHotelReservationPayload::HotelReservation(reservation) => {
            assert_eq!(reservation.id.as_str(), "41");
            assert_eq!(reservation.hotel_room_type_id, RoomTypeId::new("12"));
            assert_eq!(reservation.nb_persons, 2);
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    let requests = requests.lock().await;
    let request = &requests[0];
    assert_eq!(request.authorization.as_deref(), Some("Bearer jwt-token"));
    assert_eq!(request.body["operationName"], "SaveHotelReservation");
    assert_eq!(
        request.body["variables"],
        json!({
            "id": null,
            "hotelId": 3,
            "userId": 5,
            "hotelRoomTypeId": 12,
            "startDate": "2024-06-01",
            "endDate": "2024-06-05",
            "nbPersons": 2
        })
    );
}

#[tokio::test]
async fn input_error_is_returned_as_payload() {
    let (endpoint, _requests) = spawn_graphql_server(
        StatusCode::OK,
        json!({
            "data": {
                "saveHotelReservation": {
                    "__typename": "InputError",
                    "message": "Dates indisponibles"
                }
            }
        }),
    )
    .await
    .expect("spawn server");

    let payload = GraphQlClient::new(endpoint)
        .save_reservation(sample_variables())
        .await
        .expect("input errors are data, not failures");
    assert_eq!(
        payload,
        SaveHotelReservationPayload::InputError {
            message: "Dates indisponibles".to_string()
        }
    );
}

#[tokio::test]
async fn top_level_errors_fail_the_operation() {
    let (endpoint, _requests) = spawn_graphql_server(
        StatusCode::OK,
        json!({
            "data": null,
            "errors": [
                {"message": "Not authorised!", "extensions": {"code": "UNAUTHENTICATED"}}
            ]
        }),
    )
    .await
    .expect("spawn server");

    let err = GraphQlClient::new(endpoint)
        .execute::<_, SaveHotelReservationData>(
            SAVE_HOTEL_RESERVATION_OPERATION,
            SAVE_HOTEL_RESERVATION_MUTATION,
            &sample_variables(),
        )
        .await
        .expect_err("must fail");

    assert_eq!(err.code(), Some(ErrorCode::Unauthenticated));
    match err {
        GraphQlError::Errors { operation, errors } => {
            assert_eq!(operation, "SaveHotelReservation");
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].code(), ErrorCode::Unauthenticated);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn http_status_errors_are_reported() {
    let (endpoint, _requests) =
        spawn_graphql_server(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"}))
            .await
            .expect("spawn server");

    let err = GraphQlClient::new(endpoint)
        .list_room_types(RoomTypesQuery::default())
        .await
        .expect_err("must fail");
    let err_text = err.to_string();
    assert!(err_text.contains("HTTP 500"), "unexpected error: {err_text}");
}

#[tokio::test]
async fn missing_data_is_reported() {
    let (endpoint, _requests) = spawn_graphql_server(StatusCode::OK, json!({"data": null}))
        .await
        .expect("spawn server");

    let err = GraphQlClient::new(endpoint)
        .execute::<_, HotelRoomTypesData>(
            HOTEL_ROOM_TYPES_OPERATION,
            HOTEL_ROOM_TYPES_QUERY,
            &RoomTypesQuery::default(),
        )
        .await
        .expect_err("must fail");
    assert!(matches!(err, GraphQlError::MissingData { .. }));
    assert_eq!(err.code(), None);
}

#[tokio::test]
async fn malformed_envelope_is_a_decode_error() {
    let (endpoint, _requests) = spawn_graphql_server(StatusCode::OK, json!("not an envelope"))
        .await
        .expect("spawn server");

    let err = GraphQlClient::new(endpoint)
        .execute::<_, HotelRoomTypesData>(
            HOTEL_ROOM_TYPES_OPERATION,
            HOTEL_ROOM_TYPES_QUERY,
            &RoomTypesQuery::default(),
        )
        .await
        .expect_err("must fail");
    assert!(matches!(err, GraphQlError::Decode { .. }));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_request_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let endpoint = Url::parse(&format!("http://{addr}/graphql")).expect("url");
    let client = GraphQlClient::with_timeout(endpoint, Duration::from_secs(2)).expect("client");
    let err = client
        .execute::<_, HotelRoomTypesData>(
            HOTEL_ROOM_TYPES_OPERATION,
            HOTEL_ROOM_TYPES_QUERY,
            &RoomTypesQuery::default(),
        )
        .await
        .expect_err("must fail");
    assert!(matches!(err, GraphQlError::Request { .. }));
}

#[test]
fn mutation_ids_are_graphql_ints() {
    for variable in ["$id: Int", "$hotelId: Int", "$userId: Int", "$hotelRoomTypeId: Int"] {
        assert!(
            SAVE_HOTEL_RESERVATION_MUTATION.contains(variable),
            "missing declaration {variable}"
        );
    }

    let numeric = serde_json::to_value(sample_variables()).expect("encode");
    assert_eq!(numeric["hotelRoomTypeId"], json!(12));

    let opaque = SaveHotelReservationVariables {
        hotel_room_type_id: Some(RoomTypeId::new("rt1")),
        ..sample_variables()
    };
    let opaque = serde_json::to_value(opaque).expect("encode");
    assert_eq!(opaque["hotelRoomTypeId"], json!("rt1"));
}
