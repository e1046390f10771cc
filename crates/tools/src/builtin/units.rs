//! Unit conversion across common measurement categories.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::args::{required_f64, required_str};
use crate::{Tool, ToolContext, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Length,
    Mass,
    Volume,
    Time,
    Speed,
    Data,
    Temperature,
}

impl Category {
    fn name(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Mass => "mass",
            Self::Volume => "volume",
            Self::Time => "time",
            Self::Speed => "speed",
            Self::Data => "data",
            Self::Temperature => "temperature",
        }
    }
}

/// (aliases, category, factor to the category's base unit)
///
/// Base units: metre, kilogram, litre, second, metre/second, byte.
/// Temperature factors are unused; see [`to_kelvin`].
const UNITS: &[(&[&str], Category, f64)] = &[
    (&["mm", "millimeter", "millimeters", "millimetre", "millimetres"], Category::Length, 0.001),
    (&["cm", "centimeter", "centimeters", "centimetre", "centimetres"], Category::Length, 0.01),
    (&["m", "meter", "meters", "metre", "metres"], Category::Length, 1.0),
    (&["km", "kilometer", "kilometers", "kilometre", "kilometres"], Category::Length, 1000.0),
    (&["in", "inch", "inches"], Category::Length, 0.0254),
    (&["ft", "foot", "feet"], Category::Length, 0.3048),
    (&["yd", "yard", "yards"], Category::Length, 0.9144),
    (&["mi", "mile", "miles"], Category::Length, 1609.344),
    (&["nmi", "nautical mile", "nautical miles"], Category::Length, 1852.0),
    (&["mg", "milligram", "milligrams"], Category::Mass, 1e-6),
    (&["g", "gram", "grams"], Category::Mass, 0.001),
    (&["kg", "kilogram", "kilograms"], Category::Mass, 1.0),
    (&["t", "tonne", "tonnes", "metric ton", "metric tons"], Category::Mass, 1000.0),
    (&["oz", "ounce", "ounces"], Category::Mass, 0.028_349_523_125),
    (&["lb", "lbs", "pound", "pounds"], Category::Mass, 0.453_592_37),
    (&["st", "stone", "stones"], Category::Mass, 6.350_293_18),
    (&["ml", "milliliter", "milliliters", "millilitre", "millilitres"], Category::Volume, 0.001),
    (&["l", "liter", "liters", "litre", "litres"], Category::Volume, 1.0),
    (&["m3", "cubic meter", "cubic meters", "cubic metre", "cubic metres"], Category::Volume, 1000.0),
    (&["tsp", "teaspoon", "teaspoons"], Category::Volume, 0.004_928_921_593_75),
    (&["tbsp", "tablespoon", "tablespoons"], Category::Volume, 0.014_786_764_781_25),
    (&["cup", "cups"], Category::Volume, 0.236_588_236_5),
    (&["pt", "pint", "pints"], Category::Volume, 0.473_176_473),
    (&["qt", "quart", "quarts"], Category::Volume, 0.946_352_946),
    (&["gal", "gallon", "gallons"], Category::Volume, 3.785_411_784),
    (&["ms", "millisecond", "milliseconds"], Category::Time, 0.001),
    (&["s", "sec", "second", "seconds"], Category::Time, 1.0),
    (&["min", "minute", "minutes"], Category::Time, 60.0),
    (&["h", "hr", "hour", "hours"], Category::Time, 3600.0),
    (&["d", "day", "days"], Category::Time, 86_400.0),
    (&["wk", "week", "weeks"], Category::Time, 604_800.0),
    (&["yr", "year", "years"], Category::Time, 31_557_600.0),
    (&["m/s", "mps", "meters per second", "metres per second"], Category::Speed, 1.0),
    (&["km/h", "kmh", "kph", "kilometers per hour", "kilometres per hour"], Category::Speed, 1.0 / 3.6),
    (&["mph", "miles per hour"], Category::Speed, 0.447_04),
    (&["kn", "knot", "knots"], Category::Speed, 1852.0 / 3600.0),
    (&["b", "byte", "bytes"], Category::Data, 1.0),
    (&["kb", "kilobyte", "kilobytes"], Category::Data, 1e3),
    (&["mb", "megabyte", "megabytes"], Category::Data, 1e6),
    (&["gb", "gigabyte", "gigabytes"], Category::Data, 1e9),
    (&["tb", "terabyte", "terabytes"], Category::Data, 1e12),
    (&["kib", "kibibyte", "kibibytes"], Category::Data, 1024.0),
    (&["mib", "mebibyte", "mebibytes"], Category::Data, 1_048_576.0),
    (&["gib", "gibibyte", "gibibytes"], Category::Data, 1_073_741_824.0),
    (&["c", "°c", "celsius", "degc"], Category::Temperature, 0.0),
    (&["f", "°f", "fahrenheit", "degf"], Category::Temperature, 0.0),
    (&["k", "kelvin"], Category::Temperature, 0.0),
];

fn lookup(unit: &str) -> Option<(&'static str, Category, f64)> {
    let unit = unit.trim().to_lowercase();
    UNITS
        .iter()
        .find(|(aliases, _, _)| aliases.contains(&unit.as_str()))
        .map(|(aliases, category, factor)| (aliases[0], *category, *factor))
}

fn to_kelvin(value: f64, unit: &str) -> f64 {
    match unit {
        "c" => value + 273.15,
        "f" => (value - 32.0) * 5.0 / 9.0 + 273.15,
        _ => value,
    }
}

fn from_kelvin(value: f64, unit: &str) -> f64 {
    match unit {
        "c" => value - 273.15,
        "f" => (value - 273.15) * 9.0 / 5.0 + 32.0,
        _ => value,
    }
}

/// Convert `value` between two units of the same category.
fn convert(value: f64, from: &str, to: &str) -> Result<(f64, Category), ToolError> {
    let (from_key, from_cat, from_factor) =
        lookup(from).ok_or_else(|| ToolError::InvalidInput(format!("unknown unit '{from}'")))?;
    let (to_key, to_cat, to_factor) =
        lookup(to).ok_or_else(|| ToolError::InvalidInput(format!("unknown unit '{to}'")))?;

    if from_cat != to_cat {
        return Err(ToolError::InvalidInput(format!(
            "cannot convert {} ({from}) to {} ({to})",
            from_cat.name(),
            to_cat.name()
        )));
    }

    let result = if from_cat == Category::Temperature {
        let kelvin = to_kelvin(value, from_key);
        if kelvin < 0.0 {
            return Err(ToolError::InvalidInput(
                "temperature is below absolute zero".into(),
            ));
        }
        from_kelvin(kelvin, to_key)
    } else {
        value * from_factor / to_factor
    };

    Ok((round(result), from_cat))
}

/// Trim floating point noise (e.g. 0.30000000000000004).
fn round(v: f64) -> f64 {
    if v == 0.0 || !v.is_finite() {
        return v;
    }
    let digits = 12 - v.abs().log10().ceil() as i32;
    let scale = 10f64.powi(digits.clamp(-300, 300));
    (v * scale).round() / scale
}

/// Convert between units of length, mass, volume, time, speed, data and temperature.
pub struct ConvertUnits;

#[async_trait]
impl Tool for ConvertUnits {
    fn name(&self) -> &str {
        "convert_units"
    }

    fn description(&self) -> &str {
        "Convert a value between units of measurement: length, weight/mass, volume, time, speed, data size and temperature (e.g. km to miles, kg to pounds, Celsius to Fahrenheit)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "value": {"type": "number", "description": "Amount to convert"},
                "from_unit": {"type": "string", "description": "Unit of the value, e.g. 'km', 'lb', 'celsius'"},
                "to_unit": {"type": "string", "description": "Target unit, e.g. 'mi', 'kg', 'fahrenheit'"}
            },
            "required": ["value", "from_unit", "to_unit"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let value = required_f64(&args, "value")?;
        let from = required_str(&args, "from_unit")?;
        let to = required_str(&args, "to_unit")?;

        let (result, category) = convert(value, from, to)?;

        Ok(json!({
            "value": value,
            "from_unit": from,
            "to_unit": to,
            "category": category.name(),
            "result": result,
        }))
    }
}
