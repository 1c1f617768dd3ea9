//! Demo intakes shipped with the `aip-server` binary.

use aip_core::AipResult;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::engine::ProviderEngine;
use crate::intake::{BindHandler, HandlerOutcome, IntakeConfig, IntakeHandler, SessionContext};
use crate::offer_store::StoredOffer;

const BMI_DISCLAIMER: &str = "BMI is a screening tool, not a diagnostic measure. It does not \
account for muscle mass, bone density, or body composition. Consult a healthcare provider for \
personalized advice.";

/// Healthy weight bounds for a height, in pounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeightRange {
    pub min_lbs: i64,
    pub max_lbs: i64,
}

/// One BMI computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BmiReading {
    pub bmi: f64,
    pub category: &'static str,
    pub risk_level: &'static str,
    pub healthy_weight_range: WeightRange,
}

/// Imperial BMI, rounded to one decimal.
pub fn bmi(height_inches: f64, weight_lbs: f64) -> BmiReading {
    let value = ((weight_lbs * 703.0) / (height_inches * height_inches) * 10.0).round() / 10.0;

    let (category, risk_level) = match value {
        v if v < 18.5 => ("Underweight", "Increased health risk"),
        v if v < 25.0 => ("Normal weight", "Low health risk"),
        v if v < 30.0 => ("Overweight", "Moderate health risk"),
        v if v < 35.0 => ("Obese (Class I)", "High health risk"),
        v if v < 40.0 => ("Obese (Class II)", "Very high health risk"),
        _ => ("Obese (Class III)", "Extremely high health risk"),
    };

    let squared = height_inches * height_inches;
    BmiReading {
        bmi: value,
        category,
        risk_level,
        healthy_weight_range: WeightRange {
            min_lbs: (18.5 * squared / 703.0).round() as i64,
            max_lbs: (24.9 * squared / 703.0).round() as i64,
        },
    }
}

fn number(data: &Map<String, Value>, field: &str) -> anyhow::Result<f64> {
    data.get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow::anyhow!("{} is not a number", field))
}

fn text<'a>(data: &'a Map<String, Value>, field: &str) -> &'a str {
    data.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// Non-binding BMI calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct BmiCalculator;

impl BmiCalculator {
    pub const ID: &'static str = "bmi";

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["height_inches", "weight_lbs"],
            "properties": {
                "height_inches": {"type": "number", "exclusiveMinimum": 0, "description": "Height in inches"},
                "weight_lbs": {"type": "number", "exclusiveMinimum": 0, "description": "Weight in pounds"}
            }
        })
    }
}

#[async_trait]
impl IntakeHandler for BmiCalculator {
    async fn handle(
        &self,
        intake_data: &Map<String, Value>,
        _session: &SessionContext,
    ) -> anyhow::Result<HandlerOutcome> {
        let height = number(intake_data, "height_inches")?;
        let weight = number(intake_data, "weight_lbs")?;
        let reading = bmi(height, weight);

        let summary = format!(
            "BMI: {} ({}). {}. Healthy weight range for your height: {}-{} lbs.",
            reading.bmi,
            reading.category,
            reading.risk_level,
            reading.healthy_weight_range.min_lbs,
            reading.healthy_weight_range.max_lbs
        );

        let mut details = serde_json::to_value(&reading)?;
        if let Value::Object(map) = &mut details {
            map.insert("height_inches".to_string(), json!(height));
            map.insert("weight_lbs".to_string(), json!(weight));
            map.insert("formula".to_string(), json!("BMI = (weight_lbs * 703) / height_inches^2"));
            map.insert("disclaimer".to_string(), json!(BMI_DISCLAIMER));
        }

        Ok(HandlerOutcome::new(summary, details))
    }
}

/// A coaching plan the metabolic assessment can recommend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub name: &'static str,
    pub monthly_cost: u32,
    pub includes: &'static [&'static str],
    pub timeline: &'static str,
}

pub const INTENSIVE_METABOLIC_RESET: Plan = Plan {
    name: "Intensive Metabolic Reset",
    monthly_cost: 249,
    includes: &[
        "Personalized Power Foods database (insulin-focused)",
        "Daily glucose tracking protocol",
        "Bi-weekly coaching calls",
        "Monthly metabolic panel review",
        "Supplement protocol",
    ],
    timeline: "90-day intensive protocol",
};

pub const FOUNDATION_COACHING: Plan = Plan {
    name: "Foundation Coaching",
    monthly_cost: 149,
    includes: &[
        "Personalized Power Foods database",
        "Weekly SMS check-ins",
        "Monthly metabolic review",
        "Meal timing optimization guide",
    ],
    timeline: "90-day initial protocol",
};

pub const WEIGHT_OPTIMIZATION: Plan = Plan {
    name: "Weight Optimization Program",
    monthly_cost: 149,
    includes: &[
        "Personalized Power Foods database",
        "Weekly weigh-in tracking",
        "Bi-weekly coaching calls",
        "Metabolic rate assessment",
    ],
    timeline: "12-week program",
};

pub const ENERGY_VITALITY: Plan = Plan {
    name: "Energy & Vitality Protocol",
    monthly_cost: 129,
    includes: &[
        "Sleep and recovery optimization",
        "Personalized Power Foods database",
        "Monthly hormone panel review",
        "Supplement recommendations",
    ],
    timeline: "8-week protocol",
};

pub const COMPREHENSIVE_ASSESSMENT: Plan = Plan {
    name: "Comprehensive Health Assessment",
    monthly_cost: 99,
    includes: &[
        "Full metabolic panel review",
        "Personalized Power Foods database",
        "Monthly check-in",
        "Health optimization roadmap",
    ],
    timeline: "90-day assessment period",
};

/// Pick a plan from the concern and risk factors in `intake_data`.
pub fn recommend_plan(intake_data: &Map<String, Value>) -> Plan {
    match text(intake_data, "primary_concern") {
        "insulin_resistance" => {
            let glucose = text(intake_data, "fasting_glucose_range");
            let sedentary = text(intake_data, "activity_level") == "sedentary";
            if glucose == "high" || (glucose == "elevated" && sedentary) {
                INTENSIVE_METABOLIC_RESET
            } else {
                FOUNDATION_COACHING
            }
        }
        "weight" => WEIGHT_OPTIMIZATION,
        "energy" => ENERGY_VITALITY,
        _ => COMPREHENSIVE_ASSESSMENT,
    }
}

/// Monthly price after the 15% discount for the `60+` age band.
pub fn monthly_cost(plan: &Plan, age_range: &str) -> u32 {
    if age_range == "60+" {
        (f64::from(plan.monthly_cost) * 0.85).round() as u32
    } else {
        plan.monthly_cost
    }
}

/// Binding metabolic assessment.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetabolicAssessment;

impl MetabolicAssessment {
    pub const ID: &'static str = "metabolic-assessment";

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["age_range", "sex", "primary_concern"],
            "properties": {
                "age_range": {"type": "string"},
                "sex": {"type": "string"},
                "primary_concern": {"type": "string"},
                "fasting_glucose_range": {"type": "string", "enum": ["normal", "elevated", "high", "unknown"]},
                "activity_level": {"type": "string", "enum": ["sedentary", "light", "moderate", "active"]}
            }
        })
    }
}

#[async_trait]
impl IntakeHandler for MetabolicAssessment {
    async fn handle(
        &self,
        intake_data: &Map<String, Value>,
        _session: &SessionContext,
    ) -> anyhow::Result<HandlerOutcome> {
        let age_range = text(intake_data, "age_range");
        let plan = recommend_plan(intake_data);
        let cost = monthly_cost(&plan, age_range);

        let summary = format!(
            "Based on your profile ({}, {}), we recommend our {} at ${}/month.",
            age_range,
            text(intake_data, "primary_concern"),
            plan.name,
            cost
        );

        let details = json!({
            "recommended_plan": plan.name,
            "monthly_cost": cost,
            "currency": "USD",
            "includes": plan.includes,
            "estimated_timeline": plan.timeline,
        });

        Ok(HandlerOutcome::new(summary, details))
    }
}

/// Enrolls the user in the plan named by a redeemed assessment offer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetabolicEnrollment;

#[async_trait]
impl BindHandler for MetabolicEnrollment {
    async fn bind(&self, bind_data: &Map<String, Value>, offer: &StoredOffer) -> anyhow::Result<Value> {
        let plan = offer
            .offer
            .details
            .get("recommended_plan")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("offer {} has no recommended_plan", offer.id()))?;

        Ok(json!({
            "status": "bound",
            "message": format!(
                "Welcome, {}! Your {} enrollment is confirmed.",
                text(bind_data, "full_name"),
                plan
            ),
            "next_steps": [
                "Check your email for onboarding instructions",
                "Complete your health questionnaire",
                "Schedule your first coaching call"
            ],
            "account_ref": format!("mvh-{}", Utc::now().timestamp_millis()),
        }))
    }
}

/// Register the demo intakes on `engine`.
pub fn register_demo_intakes(engine: &ProviderEngine) -> AipResult<()> {
    engine.register(
        IntakeConfig::new(BmiCalculator::ID, "BMI Calculator", BmiCalculator)
            .description("Calculate Body Mass Index from height and weight")
            .category("health/calculator")
            .input_schema(BmiCalculator::schema())
            .offer_type("calculation")
            .binding_available(false),
    )?;

    engine.register(
        IntakeConfig::new(
            MetabolicAssessment::ID,
            "Metabolic Health Assessment",
            MetabolicAssessment,
        )
        .description("Personalized metabolic coaching plan recommendation")
        .category("health/coaching")
        .input_schema(MetabolicAssessment::schema())
        .offer_type("plan")
        .bind_requires(["email", "full_name"])
        .offer_ttl(Duration::days(14))
        .on_bind(MetabolicEnrollment),
    )?;

    Ok(())
}
