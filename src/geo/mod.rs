//! Geocoding
//!
//! Place lookup for the search box and reverse lookup for clicked points.

mod geocoder;

pub use geocoder::{GeocodeHit, Geocoder, NominatimGeocoder};
