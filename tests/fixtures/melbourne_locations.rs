//! Real locations around Melbourne's south-east for test fixtures.
//!
//! Coordinates taken from OpenStreetMap. They are routable with an OSRM
//! build of the Australia extract.

use carpool_planner::model::{Coordinates, Place};

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lon: f64) -> Self {
        Self { name, lat, lon }
    }

    pub fn coords(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }

    pub fn place(&self) -> Place {
        Place::new(self.name, self.coords())
    }
}

// ============================================================================
// Campus and nearby stations (pickups)
// ============================================================================

pub const MONASH_CLAYTON: Location = Location::new("Monash University Clayton", -37.9105, 145.1362);
pub const CLAYTON_STATION: Location = Location::new("Clayton Station", -37.9245, 145.1205);
pub const HUNTINGDALE_STATION: Location = Location::new("Huntingdale Station", -37.9108, 145.1028);
pub const OAKLEIGH_STATION: Location = Location::new("Oakleigh Station", -37.9003, 145.0883);
pub const GLEN_WAVERLEY_STATION: Location = Location::new("Glen Waverley Station", -37.8796, 145.1624);
pub const MOUNT_WAVERLEY_STATION: Location = Location::new("Mount Waverley Station", -37.8752, 145.1282);
pub const SPRINGVALE_STATION: Location = Location::new("Springvale Station", -37.9490, 145.1530);

pub const PICKUPS: &[Location] = &[
    CLAYTON_STATION,
    HUNTINGDALE_STATION,
    OAKLEIGH_STATION,
    GLEN_WAVERLEY_STATION,
    MOUNT_WAVERLEY_STATION,
    SPRINGVALE_STATION,
];

// ============================================================================
// Destinations
// ============================================================================

pub const CHADSTONE: Location = Location::new("Chadstone Shopping Centre", -37.8862, 145.0830);
pub const CAULFIELD_STATION: Location = Location::new("Caulfield Station", -37.8773, 145.0425);
pub const MELBOURNE_CENTRAL: Location = Location::new("Melbourne Central", -37.8102, 144.9628);
pub const FLINDERS_STREET: Location = Location::new("Flinders Street Station", -37.8183, 144.9671);
pub const SOUTHERN_CROSS: Location = Location::new("Southern Cross Station", -37.8184, 144.9525);
pub const BOX_HILL: Location = Location::new("Box Hill Central", -37.8193, 145.1218);
pub const DANDENONG_STATION: Location = Location::new("Dandenong Station", -37.9899, 145.2097);
