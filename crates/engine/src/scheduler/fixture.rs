//! Serializable snapshots of the scheduler cache.
//!
//! A fixture records every cached completion by source state and provider.
//! Loading one reproduces the cache without running providers, which is how
//! mixing behavior is tested against captured sessions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sibyl_primitives::SelectedBuffer;

use super::{CachedCompletion, Scheduler};
use crate::error::FixtureError;
use crate::provider::{MetaCompletion, ProviderName};
use crate::registry::ProviderTable;

/// Cached completions of one provider on one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureEntry {
	pub source: SelectedBuffer,
	pub provider: ProviderName,
	pub completions: Vec<MetaCompletion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerFixture {
	pub cache: Vec<FixtureEntry>,
}

impl SchedulerFixture {
	pub fn to_json(&self) -> Result<String, FixtureError> {
		Ok(serde_json::to_string_pretty(self)?)
	}

	pub fn from_json(src: &str) -> Result<Self, FixtureError> {
		Ok(serde_json::from_str(src)?)
	}
}

impl Scheduler {
	/// Snapshots the cache, ordered by source text, selection, then provider.
	pub fn to_fixture(&self) -> SchedulerFixture {
		let mut cache = Vec::new();
		for spec in self.specs.values() {
			for (provider, &key) in &spec.provisions {
				let completions: Vec<MetaCompletion> = self.provisions[key]
					.completions
					.values()
					.flatten()
					.map(|c| c.meta.clone())
					.collect();
				if completions.is_empty() {
					continue;
				}
				cache.push(FixtureEntry {
					source: spec.buffer.clone(),
					provider: provider.clone(),
					completions,
				});
			}
		}
		cache.sort_by(|a, b| {
			(a.source.text(), a.source.selection, &a.provider).cmp(&(b.source.text(), b.source.selection, &b.provider))
		});
		SchedulerFixture { cache }
	}

	/// Builds a scheduler whose cache holds exactly the fixture's completions.
	///
	/// Nothing is scheduled until the first [`Scheduler::update`].
	pub fn from_fixture(table: Arc<ProviderTable>, fixture: SchedulerFixture) -> Result<Self, FixtureError> {
		let mut sched = Self::new(table);
		sched.load_fixture(fixture)?;
		Ok(sched)
	}

	/// Adds the fixture's completions to the cache.
	pub fn load_fixture(&mut self, fixture: SchedulerFixture) -> Result<(), FixtureError> {
		for entry in fixture.cache {
			let key = self.provision_key(&entry.source, &entry.provider);
			for mut meta in entry.completions {
				meta.mixing.provider.get_or_insert_with(|| entry.provider.clone());
				let cached = CachedCompletion::new(&entry.source, meta)?;
				self.provisions[key]
					.completions
					.entry(cached.target().hash())
					.or_default()
					.push(cached);
			}
		}
		Ok(())
	}
}
