use crate::domain::model::{ChargingSpeed, ChargingSummary, Connector};

/// Summarizes a point's connectors. Connectors without a power rating are
/// counted but not classified.
///
/// `number_of_connectors` counts connector entries; `total_connector_quantity`
/// adds up their quantities, taking a missing quantity as one.
pub fn summarize(connectors: &[Connector]) -> ChargingSummary {
    let mut summary = ChargingSummary {
        number_of_connectors: connectors.len(),
        total_connector_quantity: connectors
            .iter()
            .map(|c| c.quantity.unwrap_or(1) as usize)
            .sum(),
        ..ChargingSummary::default()
    };

    for power in connectors.iter().filter_map(|c| c.power_kw) {
        summary.min_power_kw = Some(summary.min_power_kw.map_or(power, |m| m.min(power)));
        summary.max_power_kw = Some(summary.max_power_kw.map_or(power, |m| m.max(power)));

        let speed = ChargingSpeed::classify(power);
        match speed {
            ChargingSpeed::Slow => summary.slow_available = true,
            ChargingSpeed::Fast => summary.fast_available = true,
            ChargingSpeed::Rapid => summary.rapid_available = true,
        }
        summary.max_charging_speed = summary.max_charging_speed.max(Some(speed));
    }

    summary
}
