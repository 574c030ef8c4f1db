use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{HotelId, ReservationId, RoomTypeId, UserId},
    error::ApiError,
};

/// Body of a GraphQL POST.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest<V> {
    pub query: String,
    pub operation_name: String,
    pub variables: V,
}

/// Response envelope. A field-level failure still carries `data`, a
/// request-level failure carries only `errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTypeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotel_id: Option<HotelId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTypeOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<SortOrder>,
}

/// Variables of the `HotelRoomTypes` query. All-`None` fetches the whole
/// catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTypesQuery {
    pub page: Option<u32>,
    pub take: Option<u32>,
    pub filter: Option<RoomTypeFilter>,
    pub order_by: Option<RoomTypeOrder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTypeName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelRoomTypeNode {
    pub id: RoomTypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotel_id: Option<HotelId>,
    pub room_type: RoomTypeName,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTypePage {
    #[serde(default)]
    pub count: u64,
    #[serde(rename = "hotelRoomTypes", default)]
    pub items: Vec<HotelRoomTypeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelRoomTypesData {
    pub hotel_room_types: RoomTypePage,
}

/// Variables of the `SaveHotelReservation` mutation. `id` is always sent
/// (as `null` when creating) and unset draft fields go out as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveHotelReservationVariables {
    pub id: Option<ReservationId>,
    pub hotel_id: HotelId,
    pub user_id: UserId,
    pub hotel_room_type_id: Option<RoomTypeId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub nb_persons: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelReservation {
    pub id: ReservationId,
    pub hotel_id: HotelId,
    pub user_id: UserId,
    pub hotel_room_type_id: RoomTypeId,
    #[serde(with = "calendar_date")]
    pub start_date: NaiveDate,
    #[serde(with = "calendar_date")]
    pub end_date: NaiveDate,
    pub nb_persons: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum SaveHotelReservationPayload {
    InputError { message: String },
    HotelReservation(HotelReservation),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveHotelReservationData {
    pub save_hotel_reservation: SaveHotelReservationPayload,
}

/// Dates are written as `YYYY-MM-DD`; servers backed by timestamp columns
/// echo them as RFC 3339, so only the calendar part is read back.
mod calendar_date {
    use chrono::NaiveDate;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let calendar_part = raw.get(..10).unwrap_or(&raw);
        NaiveDate::parse_from_str(calendar_part, FORMAT).map_err(D::Error::custom)
    }
}
