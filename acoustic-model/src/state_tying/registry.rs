use std::fmt;
use std::path::Path;
use std::sync::Arc;

use hashbrown::HashMap;

use super::{ClassicStateTying, DecisionTreeTying, LookupTable, MonophoneTable, StateTying};
use crate::config::{StateTyingConfig, StateTyingType};
use crate::error::{Error, Result};
use crate::model::ClassicStateModel;

pub type StateTyingBuilder =
    Box<dyn Fn(&StateTyingConfig, &Arc<ClassicStateModel>) -> Result<StateTying> + Send + Sync>;

/// Constructors of state tyings by configured type.
pub struct StateTyingRegistry {
    builders: HashMap<StateTyingType, StateTyingBuilder>,
}

fn required_file(config: &StateTyingConfig) -> Result<&Path> {
    config.file.as_deref().ok_or_else(|| Error::MissingFile {
        kind: config.type_.name().into(),
    })
}

impl StateTyingRegistry {
    /// A registry without any state tying.
    pub fn empty() -> StateTyingRegistry {
        StateTyingRegistry {
            builders: HashMap::new(),
        }
    }

    /// Replaces any builder registered for `type_`.
    pub fn register<F>(&mut self, type_: StateTyingType, builder: F)
    where
        F: Fn(&StateTyingConfig, &Arc<ClassicStateModel>) -> Result<StateTying> + Send + Sync + 'static,
    {
        if self.builders.insert(type_, Box::new(builder)).is_some() {
            log::debug!("replaced state tying builder for {}", type_.name());
        }
    }

    #[inline(always)]
    pub fn contains(&self, type_: StateTyingType) -> bool {
        self.builders.contains_key(&type_)
    }

    pub fn build(&self, config: &StateTyingConfig, model: Arc<ClassicStateModel>) -> Result<ClassicStateTying> {
        let builder = self
            .builders
            .get(&config.type_)
            .ok_or_else(|| Error::UnsupportedStateTying(config.type_.name().into()))?;
        let tying = builder(config, &model)?;
        Ok(ClassicStateTying::new(model, tying))
    }
}

impl Default for StateTyingRegistry {
    fn default() -> StateTyingRegistry {
        let mut registry = StateTyingRegistry::empty();
        registry.register(StateTyingType::NoTying, |_, _| Ok(StateTying::NoTying));
        registry.register(StateTyingType::Monophone, |_, model| {
            Ok(StateTying::Monophone(MonophoneTable::new(model)))
        });
        registry.register(StateTyingType::Lut, |config, model| {
            Ok(StateTying::Lut(LookupTable::from_path(required_file(config)?, model)?))
        });
        registry.register(StateTyingType::Cart, |config, model| {
            Ok(StateTying::DecisionTree(DecisionTreeTying::from_path(
                required_file(config)?,
                model,
            )?))
        });
        registry
    }
}

impl fmt::Debug for StateTyingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.builders.keys().map(|t| t.name()).collect();
        names.sort_unstable();
        f.debug_struct("StateTyingRegistry").field("types", &names).finish()
    }
}
