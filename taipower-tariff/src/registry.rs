use std::collections::HashMap;

use tracing::debug;

use crate::{
    data::load_plans,
    error::{Result, TariffError},
    plan::TariffPlan,
};

const BUILTIN_PLANS: &str = include_str!("../data/plans.toml");

/// Plans addressable by id, Chinese or English name, or alias.
#[derive(Debug)]
pub struct PlanRegistry {
    plans: Vec<TariffPlan>,
    by_name: HashMap<String, usize>,
}

impl PlanRegistry {
    /// Plans shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_PLANS)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Self::new(load_plans(text)?)
    }

    /// Index the plans by every name they answer to.
    ///
    /// Two plans answering to the same normalized name is a configuration error.
    pub fn new(plans: Vec<TariffPlan>) -> Result<Self> {
        let mut by_name = HashMap::new();
        for (index, plan) in plans.iter().enumerate() {
            let metadata = &plan.metadata;
            let bilingual = format!("{} {}", metadata.name_zh, metadata.name_en);
            let names = [&metadata.id, &metadata.name_zh, &metadata.name_en, &bilingual]
                .into_iter()
                .chain(&metadata.aliases)
                .map(|name| normalize_name(name))
                .filter(|name| !name.is_empty());
            for name in names {
                if let Some(other) = by_name.insert(name.clone(), index)
                    && other != index
                {
                    return Err(TariffError::configuration(format!(
                        "`{}` and `{}` both answer to `{name}`",
                        plans[other].id(),
                        plan.id(),
                    )));
                }
            }
        }
        debug!(n_plans = plans.len(), n_names = by_name.len(), "indexed the plans");
        Ok(Self { plans, by_name })
    }

    pub fn get(&self, name: &str) -> Result<&TariffPlan> {
        self.by_name
            .get(&normalize_name(name))
            .map(|index| &self.plans[*index])
            .ok_or_else(|| TariffError::UnknownPlan(name.to_owned()))
    }

    #[must_use]
    pub fn plans(&self) -> &[TariffPlan] {
        &self.plans
    }
}

/// Lowercase, and drop whitespace and punctuation.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Simple 2-Tier"), "simple2tier");
        assert_eq!(normalize_name("residential_simple_2_tier"), "residentialsimple2tier");
        assert_eq!(normalize_name("表燈非時間-營業用"), "表燈非時間營業用");
    }

    #[test]
    fn test_lookup_variants() -> Result {
        let registry = PlanRegistry::builtin()?;
        for name in [
            "residential_simple_2_tier",
            "ResidentialSimple2Tier",
            "簡易型二段式",
            "Simple 2-Tier",
            "simple2tier",
            "簡易型二段式 Simple 2-Tier",
            "  簡易 ",
        ] {
            assert_eq!(registry.get(name)?.id(), "residential_simple_2_tier", "{name}");
        }
        assert_eq!(registry.get("高壓電力二段式")?.id(), "high_voltage_2_tier");
        assert_eq!(registry.get("表燈非時間")?.id(), "residential_non_tou");
        Ok(())
    }

    #[test]
    fn test_unknown_plan() -> Result {
        let registry = PlanRegistry::builtin()?;
        assert!(matches!(registry.get("nope"), Err(TariffError::UnknownPlan(name)) if name == "nope"));
        Ok(())
    }

    #[test]
    fn test_builtin_plans() -> Result {
        let registry = PlanRegistry::builtin()?;
        let ids: Vec<_> = registry.plans().iter().map(TariffPlan::id).collect();
        assert_eq!(
            ids,
            [
                "residential_non_tou",
                "lighting_business_tiered",
                "residential_simple_2_tier",
                "residential_simple_3_tier",
                "high_voltage_2_tier",
                "high_voltage_three_stage",
            ],
        );
        Ok(())
    }

    #[test]
    fn test_name_collision() {
        let text = r#"
            [[plan]]
            id = "first"
            name_zh = "甲"
            name_en = "Same"
            tiers = { summer = [{ rate = 1.0 }], non_summer = [{ rate = 1.0 }] }

            [[plan]]
            id = "second"
            name_zh = "乙"
            name_en = "same"
            tiers = { summer = [{ rate = 1.0 }], non_summer = [{ rate = 1.0 }] }
        "#;
        assert!(PlanRegistry::from_toml(text).unwrap_err().is_configuration());
    }
}
