//! Rule-based care tips derived from the current sensor readings.
//!
//! The engine is a pure function of three resolved numbers: one watering tip,
//! one temperature tip, an optional humidity tip, then three fixed general
//! tips, always in that order.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Soil moisture (%) below which the plant needs water now.
const SOIL_DRY_BELOW: f64 = 30.0;
/// Soil moisture (%) above which watering should be reduced.
const SOIL_WET_ABOVE: f64 = 75.0;
/// Temperature (°C) below which the plant is too cool.
const TEMP_COLD_BELOW: f64 = 18.0;
/// Temperature (°C) above which the plant is too warm.
const TEMP_HOT_ABOVE: f64 = 28.0;
/// Relative air humidity (%) below which the air is too dry.
const HUMIDITY_DRY_BELOW: f64 = 40.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Watering,
    Temperature,
    General,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CareTip {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub priority: Priority,
    pub category: Category,
}

/// Fully resolved readings. Callers must not pass NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditions {
    pub air_humidity: f64,
    pub soil_moisture: f64,
    pub temperature: f64,
}

// ---------------------------------------------------------------------------
// Tip catalogue
// ---------------------------------------------------------------------------

const WATER_LOW: CareTip = CareTip {
    id: "water-low",
    title: "Water your basil plant",
    description: "Soil moisture is low. Water thoroughly until moisture reaches 40-60%.",
    priority: Priority::High,
    category: Category::Watering,
};

const WATER_HIGH: CareTip = CareTip {
    id: "water-high",
    title: "Reduce watering",
    description: "Soil is too wet. Allow to dry out slightly before watering again.",
    priority: Priority::Medium,
    category: Category::Watering,
};

const WATER_GOOD: CareTip = CareTip {
    id: "water-good",
    title: "Watering is optimal",
    description: "Current soil moisture is ideal for basil. Maintain this level.",
    priority: Priority::Low,
    category: Category::Watering,
};

const TEMP_LOW: CareTip = CareTip {
    id: "temp-low",
    title: "Increase temperature",
    description: "Environment is too cool for basil. Ideal temperature is 20-25°C.",
    priority: Priority::High,
    category: Category::Temperature,
};

const TEMP_HIGH: CareTip = CareTip {
    id: "temp-high",
    title: "Reduce temperature",
    description: "Environment is too warm. Move to a cooler location or improve air circulation.",
    priority: Priority::High,
    category: Category::Temperature,
};

const TEMP_GOOD: CareTip = CareTip {
    id: "temp-good",
    title: "Temperature is optimal",
    description: "Current temperature is ideal for basil growth.",
    priority: Priority::Low,
    category: Category::Temperature,
};

const HUMIDITY_LOW: CareTip = CareTip {
    id: "humidity-low",
    title: "Increase humidity",
    description: "Air is too dry. Mist leaves or use a humidity tray.",
    priority: Priority::Medium,
    category: Category::General,
};

/// Appended to every result, in this order.
const GENERAL_TIPS: [CareTip; 3] = [
    CareTip {
        id: "prune-tip",
        title: "Prune regularly",
        description: "Pinch off flower buds and top leaves to encourage bushier growth.",
        priority: Priority::Low,
        category: Category::General,
    },
    CareTip {
        id: "harvest-tip",
        title: "Harvest correctly",
        description: "Harvest from the top down, taking whole stems rather than individual leaves.",
        priority: Priority::Low,
        category: Category::General,
    },
    // No light sensor on the device, so this one is unconditional.
    CareTip {
        id: "light-general",
        title: "Ensure adequate light",
        description: "Basil plants need 6-8 hours of sunlight daily. Place near a south-facing window for best results.",
        priority: Priority::Medium,
        category: Category::General,
    },
];

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Derive the ordered tip list for a set of readings.
pub fn care_tips(c: &Conditions) -> Vec<CareTip> {
    let mut tips = Vec::with_capacity(6);

    tips.push(if c.soil_moisture < SOIL_DRY_BELOW {
        WATER_LOW
    } else if c.soil_moisture > SOIL_WET_ABOVE {
        WATER_HIGH
    } else {
        WATER_GOOD
    });

    tips.push(if c.temperature < TEMP_COLD_BELOW {
        TEMP_LOW
    } else if c.temperature > TEMP_HOT_ABOVE {
        TEMP_HIGH
    } else {
        TEMP_GOOD
    });

    if c.air_humidity < HUMIDITY_DRY_BELOW {
        tips.push(HUMIDITY_LOW);
    }

    tips.extend(GENERAL_TIPS);
    tips
}

// ---------------------------------------------------------------------------
// Display grouping
// ---------------------------------------------------------------------------

/// Category selector used by the tips view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipFilter {
    All,
    Only(Category),
}

impl TipFilter {
    pub fn matches(self, tip: &CareTip) -> bool {
        match self {
            TipFilter::All => true,
            TipFilter::Only(category) => tip.category == category,
        }
    }
}

impl FromStr for TipFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(TipFilter::All),
            "watering" => Ok(TipFilter::Only(Category::Watering)),
            "temperature" => Ok(TipFilter::Only(Category::Temperature)),
            "general" => Ok(TipFilter::Only(Category::General)),
            other => Err(format!("unknown tip category '{other}'")),
        }
    }
}

impl fmt::Display for TipFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TipFilter::All => "all",
            TipFilter::Only(Category::Watering) => "watering",
            TipFilter::Only(Category::Temperature) => "temperature",
            TipFilter::Only(Category::General) => "general",
        };
        f.write_str(s)
    }
}

/// Tips split into the urgent group and everything else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedTips {
    pub high: Vec<CareTip>,
    pub other: Vec<CareTip>,
}

/// Filter by category, then partition by priority. Relative order is kept
/// within both groups.
pub fn group_tips(tips: &[CareTip], filter: TipFilter) -> GroupedTips {
    let (high, other): (Vec<CareTip>, Vec<CareTip>) = tips
        .iter()
        .filter(|t| filter.matches(t))
        .cloned()
        .partition(|t| t.priority == Priority::High);
    GroupedTips { high, other }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn conditions(air_humidity: f64, soil_moisture: f64, temperature: f64) -> Conditions {
        Conditions {
            air_humidity,
            soil_moisture,
            temperature,
        }
    }

    fn ids(tips: &[CareTip]) -> Vec<&'static str> {
        tips.iter().map(|t| t.id).collect()
    }

    fn by_category(tips: &[CareTip], category: Category) -> Vec<&CareTip> {
        tips.iter().filter(|t| t.category == category).collect()
    }

    // -- Watering ---------------------------------------------------------

    #[test]
    fn dry_soil_yields_single_high_watering_tip() {
        for soil in [0.0, 12.5, 29.99] {
            let tips = care_tips(&conditions(50.0, soil, 22.0));
            let watering = by_category(&tips, Category::Watering);
            assert_eq!(watering.len(), 1);
            assert_eq!(watering[0].id, "water-low");
            assert_eq!(watering[0].priority, Priority::High);
        }
    }

    #[test]
    fn soil_in_band_is_optimal_including_edges() {
        for soil in [30.0, 50.0, 75.0] {
            let tips = care_tips(&conditions(50.0, soil, 22.0));
            assert_eq!(tips[0].id, "water-good", "soil={soil}");
            assert_eq!(tips[0].priority, Priority::Low);
        }
    }

    #[test]
    fn wet_soil_yields_medium_reduce_tip() {
        let tips = care_tips(&conditions(50.0, 75.01, 22.0));
        assert_eq!(tips[0].id, "water-high");
        assert_eq!(tips[0].priority, Priority::Medium);
    }

    // -- Temperature ------------------------------------------------------

    #[test]
    fn temperature_outside_band_is_high_priority() {
        let cold = care_tips(&conditions(50.0, 50.0, 17.9));
        assert_eq!(cold[1].id, "temp-low");
        assert_eq!(cold[1].priority, Priority::High);

        let hot = care_tips(&conditions(50.0, 50.0, 28.1));
        assert_eq!(hot[1].id, "temp-high");
        assert_eq!(hot[1].priority, Priority::High);
    }

    #[test]
    fn temperature_band_edges_are_optimal() {
        for temp in [18.0, 23.0, 28.0] {
            let tips = care_tips(&conditions(50.0, 50.0, temp));
            let temperature = by_category(&tips, Category::Temperature);
            assert_eq!(temperature.len(), 1);
            assert_eq!(temperature[0].id, "temp-good");
            assert_eq!(temperature[0].priority, Priority::Low);
        }
    }

    // -- Humidity ---------------------------------------------------------

    #[test]
    fn humidity_at_or_above_threshold_adds_nothing() {
        for humidity in [40.0, 65.0, 100.0] {
            let tips = care_tips(&conditions(humidity, 50.0, 22.0));
            assert!(!tips.iter().any(|t| t.id == "humidity-low"));
        }
    }

    #[test]
    fn dry_air_adds_one_medium_humidity_tip() {
        let tips = care_tips(&conditions(39.9, 50.0, 22.0));
        let humidity: Vec<_> = tips.iter().filter(|t| t.id == "humidity-low").collect();
        assert_eq!(humidity.len(), 1);
        assert_eq!(humidity[0].priority, Priority::Medium);
        assert_eq!(humidity[0].category, Category::General);
    }

    // -- Ordering / totality ----------------------------------------------

    #[test]
    fn order_is_watering_temperature_humidity_then_generals() {
        let tips = care_tips(&conditions(10.0, 10.0, 10.0));
        assert_eq!(
            ids(&tips),
            vec![
                "water-low",
                "temp-low",
                "humidity-low",
                "prune-tip",
                "harvest-tip",
                "light-general"
            ]
        );
    }

    #[test]
    fn comfortable_conditions_produce_five_tips() {
        let tips = care_tips(&conditions(55.0, 50.0, 22.0));
        assert_eq!(
            ids(&tips),
            vec![
                "water-good",
                "temp-good",
                "prune-tip",
                "harvest-tip",
                "light-general"
            ]
        );
    }

    #[test]
    fn engine_is_deterministic() {
        let c = conditions(33.0, 80.0, 30.0);
        let a = serde_json::to_string(&care_tips(&c)).unwrap();
        let b = serde_json::to_string(&care_tips(&c)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn general_tips_have_fixed_priorities() {
        let tips = care_tips(&conditions(55.0, 50.0, 22.0));
        let tail: Vec<_> = tips[tips.len() - 3..].iter().map(|t| t.priority).collect();
        assert_eq!(tail, vec![Priority::Low, Priority::Low, Priority::Medium]);
    }

    #[test]
    fn tip_serializes_lowercase_enums() {
        let json = serde_json::to_value(&WATER_LOW).unwrap();
        assert_eq!(json["priority"], "high");
        assert_eq!(json["category"], "watering");
        assert_eq!(json["id"], "water-low");
    }

    // -- Filter / grouping ------------------------------------------------

    #[test]
    fn filter_parses_known_categories() {
        assert_eq!("all".parse::<TipFilter>(), Ok(TipFilter::All));
        assert_eq!(
            "general".parse::<TipFilter>(),
            Ok(TipFilter::Only(Category::General))
        );
        assert!("lighting".parse::<TipFilter>().is_err());
        assert!("ALL".parse::<TipFilter>().is_err());
    }

    #[test]
    fn filter_display_round_trips() {
        for s in ["all", "watering", "temperature", "general"] {
            assert_eq!(s.parse::<TipFilter>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn grouping_splits_high_from_rest_preserving_order() {
        let tips = care_tips(&conditions(10.0, 10.0, 35.0));
        let grouped = group_tips(&tips, TipFilter::All);
        assert_eq!(ids(&grouped.high), vec!["water-low", "temp-high"]);
        assert_eq!(
            ids(&grouped.other),
            vec!["humidity-low", "prune-tip", "harvest-tip", "light-general"]
        );
    }

    #[test]
    fn grouping_by_category_keeps_only_that_category() {
        let tips = care_tips(&conditions(10.0, 50.0, 22.0));
        let grouped = group_tips(&tips, TipFilter::Only(Category::General));
        assert!(grouped.high.is_empty());
        assert_eq!(
            ids(&grouped.other),
            vec!["humidity-low", "prune-tip", "harvest-tip", "light-general"]
        );

        let watering = group_tips(&tips, TipFilter::Only(Category::Watering));
        assert_eq!(ids(&watering.other), vec!["water-good"]);
    }
}
