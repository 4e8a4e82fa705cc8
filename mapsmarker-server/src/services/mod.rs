//! Collaborators the store calls out to

pub mod geocoding;
pub mod translations;

pub use geocoding::{DisabledGeocoder, GeoPoint, GeocodeError, Geocoder, NominatimGeocoder};
pub use translations::{NoopTranslations, TracingTranslations, TranslationSink};
