//! Scripted demonstration scenarios for the medical-indicators API
//!
//! Mirrors the mock data a mobile application would post: a normal reading,
//! a critical reading, and server-generated random readings, each submitted
//! and then analyzed through the REST client.

use crate::api::{ApiClient, ApiError, IndicatorsDto};

/// Example of the payload a mobile application posts.
pub fn example_mobile_data() -> IndicatorsDto {
    IndicatorsDto::new(75, 36.8, 98, 12345)
}

/// Submit and analyze a reading with every indicator in range.
pub async fn demonstrate_normal_indicators(client: &ApiClient) -> Result<(), ApiError> {
    println!("=== Normal indicators demonstration ===");
    let indicators = IndicatorsDto::new(72, 36.6, 99, 1001);

    let ack = client.submit_indicators(&indicators).await?;
    println!("Normal indicators submitted: {}", ack);

    let analysis = client.analyze(&indicators).await?;
    println!("Normal indicators analysis: {}", analysis);
    Ok(())
}

/// Submit and analyze a reading violating all three ranges at once.
pub async fn demonstrate_critical_indicators(client: &ApiClient) -> Result<(), ApiError> {
    println!("=== Critical indicators demonstration ===");
    let indicators = IndicatorsDto::new(45, 39.2, 88, 1002);

    let ack = client.submit_indicators(&indicators).await?;
    println!("Critical indicators submitted: {}", ack);

    let analysis = client.analyze(&indicators).await?;
    println!("Critical indicators analysis: {}", analysis);
    Ok(())
}

/// Let the server generate readings (with and without critical values) and
/// post each back through the submit endpoint.
pub async fn demonstrate_random_generation(client: &ApiClient) -> Result<(), ApiError> {
    println!("=== Random generation demonstration ===");

    let normal = client.generate_random(false).await?;
    log::info!(
        "Generated normal indicators: {} bpm, {}°C, {}%",
        normal.heartrate,
        normal.temperature,
        normal.spo2
    );
    let ack = client.submit_indicators(&normal).await?;
    println!("Generated (normal) submitted: {}", ack);

    let maybe_critical = client.generate_random(true).await?;
    log::info!(
        "Generated indicators (possibly critical): {} bpm, {}°C, {}%",
        maybe_critical.heartrate,
        maybe_critical.temperature,
        maybe_critical.spo2
    );
    let ack = client.submit_indicators(&maybe_critical).await?;
    println!("Generated (possibly critical) submitted: {}", ack);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, IndicatorSample};

    #[test]
    fn test_example_mobile_data_is_normal() {
        let dto = example_mobile_data();
        let sample = IndicatorSample::new(
            dto.heartrate,
            dto.temperature,
            dto.spo2,
            dto.patient_id.unwrap(),
        );
        assert_eq!(Category::of(&sample), Category::Normal);
    }
}
