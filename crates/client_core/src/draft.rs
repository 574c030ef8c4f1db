//! In-progress reservation state and the rules that gate its submission.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{DateAnchor, HotelId, RoomTypeId, UserId},
    protocol::SaveHotelReservationVariables,
};
use thiserror::Error;

pub const MIN_PARTY_SIZE: u32 = 1;

/// Where draft completeness is enforced before a reservation is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Incomplete drafts are rejected without a network call.
    #[default]
    Local,
    /// The draft is sent as-is and the server is the only judge.
    ServerAuthoritative,
}

impl ValidationMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local" => Some(Self::Local),
            "server" | "server_authoritative" => Some(Self::ServerAuthoritative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("Please choose a room type")]
    MissingRoomType,
    #[error("Please choose an arrival date")]
    MissingStartDate,
    #[error("Please choose a departure date")]
    MissingEndDate,
    #[error("Departure date {end} is before arrival date {start}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
    #[error("A reservation needs at least one person")]
    PartySizeBelowMinimum,
    #[error("At most {limit} persons can be booked, got {size}")]
    PartySizeAboveLimit { limit: u32, size: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftReservation {
    hotel_id: HotelId,
    user_id: UserId,
    room_type_id: Option<RoomTypeId>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    party_size: u32,
}

impl DraftReservation {
    pub fn new(hotel_id: HotelId, user_id: UserId) -> Self {
        Self {
            hotel_id,
            user_id,
            room_type_id: None,
            start_date: None,
            end_date: None,
            party_size: MIN_PARTY_SIZE,
        }
    }

    pub fn hotel_id(&self) -> &HotelId {
        &self.hotel_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn room_type_id(&self) -> Option<&RoomTypeId> {
        self.room_type_id.as_ref()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn party_size(&self) -> u32 {
        self.party_size
    }

    /// Returns whether the selection changed.
    pub fn select_room_type(&mut self, room_type_id: RoomTypeId) -> bool {
        if self.room_type_id.as_ref() == Some(&room_type_id) {
            return false;
        }
        self.room_type_id = Some(room_type_id);
        true
    }

    /// Overwrites one end of the stay. Ordering is checked at submit time only,
    /// so a picker may report the departure before the arrival.
    pub fn set_date(&mut self, anchor: DateAnchor, date: NaiveDate) -> bool {
        let slot = match anchor {
            DateAnchor::StartDate => &mut self.start_date,
            DateAnchor::EndDate => &mut self.end_date,
        };
        if *slot == Some(date) {
            return false;
        }
        *slot = Some(date);
        true
    }

    /// `max(1, party_size + delta)`; no ceiling is applied here.
    pub fn adjust_party_size(&mut self, delta: i32) -> u32 {
        let next = (i64::from(self.party_size) + i64::from(delta))
            .clamp(i64::from(MIN_PARTY_SIZE), i64::from(u32::MAX));
        self.party_size = u32::try_from(next).unwrap_or(u32::MAX);
        self.party_size
    }

    pub fn validate(&self, max_party_size: Option<u32>) -> Result<(), DraftError> {
        if self.room_type_id.is_none() {
            return Err(DraftError::MissingRoomType);
        }
        let start = self.start_date.ok_or(DraftError::MissingStartDate)?;
        let end = self.end_date.ok_or(DraftError::MissingEndDate)?;
        if start > end {
            return Err(DraftError::InvertedDateRange { start, end });
        }
        if self.party_size < MIN_PARTY_SIZE {
            return Err(DraftError::PartySizeBelowMinimum);
        }
        if let Some(limit) = max_party_size {
            if self.party_size > limit {
                return Err(DraftError::PartySizeAboveLimit {
                    limit,
                    size: self.party_size,
                });
            }
        }
        Ok(())
    }

    /// Mutation variables for creating a reservation from this draft. Unset
    /// fields are carried as `None` and serialize to `null`.
    pub fn to_variables(&self) -> SaveHotelReservationVariables {
        SaveHotelReservationVariables {
            id: None,
            hotel_id: self.hotel_id.clone(),
            user_id: self.user_id.clone(),
            hotel_room_type_id: self.room_type_id.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            nb_persons: self.party_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn draft() -> DraftReservation {
        DraftReservation::new(HotelId::new("3"), UserId::new("5"))
    }

    fn complete_draft() -> DraftReservation {
        let mut draft = draft();
        draft.select_room_type(RoomTypeId::new("rt1"));
        draft.set_date(DateAnchor::StartDate, date(2024, 6, 1));
        draft.set_date(DateAnchor::EndDate, date(2024, 6, 5));
        draft
    }

    #[test]
    fn new_draft_starts_with_one_person_and_nothing_selected() {
        let draft = draft();
        assert_eq!(draft.party_size(), 1);
        assert!(draft.room_type_id().is_none());
        assert!(draft.start_date().is_none());
        assert!(draft.end_date().is_none());
    }

    #[test]
    fn party_size_never_drops_below_one() {
        for start in 1..=6_i32 {
            for delta in -10..=10_i32 {
                let mut draft = draft();
                draft.adjust_party_size(start - 1);
                assert_eq!(draft.party_size() as i32, start);

                let size = draft.adjust_party_size(delta);
                assert_eq!(size as i32, (start + delta).max(1), "start={start} delta={delta}");
            }
        }
    }

    #[test]
    fn party_size_saturates_on_extreme_deltas() {
        let mut draft = draft();
        assert_eq!(draft.adjust_party_size(i32::MIN), 1);
        draft.adjust_party_size(i32::MAX);
        draft.adjust_party_size(i32::MAX);
        draft.adjust_party_size(i32::MAX);
        assert_eq!(draft.party_size(), u32::MAX);
    }

    #[test]
    fn reselecting_same_room_type_reports_no_change() {
        let mut draft = draft();
        assert!(draft.select_room_type(RoomTypeId::new("rt1")));
        assert!(!draft.select_room_type(RoomTypeId::new("rt1")));
        assert!(draft.select_room_type(RoomTypeId::new("rt2")));
    }

    #[test]
    fn date_anchors_overwrite_only_their_own_field() {
        let mut draft = draft();
        draft.set_date(DateAnchor::EndDate, date(2024, 6, 5));
        assert_eq!(draft.start_date(), None);
        assert_eq!(draft.end_date(), Some(date(2024, 6, 5)));

        draft.set_date(DateAnchor::StartDate, date(2024, 6, 1));
        draft.set_date(DateAnchor::StartDate, date(2024, 6, 2));
        assert_eq!(draft.start_date(), Some(date(2024, 6, 2)));
        assert_eq!(draft.end_date(), Some(date(2024, 6, 5)));
    }

    #[test]
    fn validation_reports_first_missing_field() {
        assert_eq!(draft().validate(None), Err(DraftError::MissingRoomType));

        let mut missing_dates = draft();
        missing_dates.select_room_type(RoomTypeId::new("rt1"));
        assert_eq!(missing_dates.validate(None), Err(DraftError::MissingStartDate));

        missing_dates.set_date(DateAnchor::StartDate, date(2024, 6, 1));
        assert_eq!(missing_dates.validate(None), Err(DraftError::MissingEndDate));
    }

    #[test]
    fn validation_rejects_inverted_range_but_allows_single_day() {
        let mut draft = complete_draft();
        draft.set_date(DateAnchor::StartDate, date(2024, 6, 9));
        assert_eq!(
            draft.validate(None),
            Err(DraftError::InvertedDateRange {
                start: date(2024, 6, 9),
                end: date(2024, 6, 5),
            })
        );

        draft.set_date(DateAnchor::EndDate, date(2024, 6, 9));
        assert_eq!(draft.validate(None), Ok(()));
    }

    #[test]
    fn configured_ceiling_limits_party_size() {
        let mut draft = complete_draft();
        draft.adjust_party_size(4);
        assert_eq!(draft.validate(None), Ok(()));
        assert_eq!(draft.validate(Some(5)), Ok(()));
        assert_eq!(
            draft.validate(Some(4)),
            Err(DraftError::PartySizeAboveLimit { limit: 4, size: 5 })
        );
    }

    #[test]
    fn variables_mirror_draft_fields() {
        let mut draft = complete_draft();
        draft.adjust_party_size(1);
        let variables = draft.to_variables();
        assert_eq!(variables.id, None);
        assert_eq!(variables.hotel_id, HotelId::new("3"));
        assert_eq!(variables.user_id, UserId::new("5"));
        assert_eq!(variables.hotel_room_type_id, Some(RoomTypeId::new("rt1")));
        assert_eq!(variables.start_date, Some(date(2024, 6, 1)));
        assert_eq!(variables.end_date, Some(date(2024, 6, 5)));
        assert_eq!(variables.nb_persons, 2);
    }

    #[test]
    fn validation_mode_parses_config_spellings() {
        assert_eq!(ValidationMode::parse("local"), Some(ValidationMode::Local));
        assert_eq!(
            ValidationMode::parse("Server-Authoritative"),
            Some(ValidationMode::ServerAuthoritative)
        );
        assert_eq!(ValidationMode::parse("off"), None);
    }
}
