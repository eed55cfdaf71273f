use crate::db::models::Location;
use crate::error::AppError;
use crate::geocoder::client::Geocoder;

/// Earth radius in miles, used to turn a distance into radians.
pub const EARTH_RADIUS_MILES: f64 = 3963.0;

/// Angular radius of a circle `distance_miles` wide on the Earth's surface.
pub fn radius_in_radians(distance_miles: f64) -> f64 {
    distance_miles / EARTH_RADIUS_MILES
}

/// Resolve `address` into a stored location.
pub async fn locate(geocoder: &dyn Geocoder, address: &str) -> Result<Location, AppError> {
    geocoder
        .geocode(address)
        .await?
        .map(|found| found.into_location())
        .ok_or_else(|| AppError::BadRequest(format!("Could not geocode address '{address}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoder::client::{GeocodedAddress, MockGeocoder};

    #[test]
    fn test_radius_in_radians() {
        assert_eq!(radius_in_radians(3963.0), 1.0);
        assert!((radius_in_radians(10.0) - 0.002523).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_locate_uses_geocoder_result() {
        let mut geocoder = MockGeocoder::new();
        geocoder
            .expect_geocode()
            .withf(|address| address == "02118")
            .times(1)
            .returning(|_| {
                Ok(Some(GeocodedAddress {
                    latitude: 42.34,
                    longitude: -71.07,
                    zipcode: Some("02118".into()),
                    ..Default::default()
                }))
            });

        let location = locate(&geocoder, "02118").await.unwrap();
        assert_eq!(location.coordinates, vec![-71.07, 42.34]);
        assert_eq!(location.zipcode.as_deref(), Some("02118"));
    }

    #[tokio::test]
    async fn test_unknown_address_is_a_bad_request() {
        let mut geocoder = MockGeocoder::new();
        geocoder.expect_geocode().returning(|_| Ok(None));

        let err = locate(&geocoder, "nowhere").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
