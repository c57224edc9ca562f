//! Provider tables: which providers run where, and in what order.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::provider::{Analyzer, MetaCompletion, Provider, ProviderName};

/// Tie-breaking comparator a provider may supply for its own completions.
pub type Comparator = fn(&MetaCompletion, &MetaCompletion) -> Ordering;

bitflags::bitflags! {
	/// Roles a provider plays in scheduling and mixing.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct ProviderFlags: u8 {
		/// Blocking requests wait for this provider on the root state.
		const BLOCKING = 1 << 0;
		/// Runs on speculative states below the root.
		const SPECULATE = 1 << 1;
		/// Contributes completions on non-root states during collection.
		const COMPOSE = 1 << 2;
		/// Completions are produced by a learned model.
		const SMART = 1 << 3;
	}
}

/// One provider's table entry.
#[derive(Debug, Clone)]
pub struct ProviderEntry {
	pub name: ProviderName,
	pub flags: ProviderFlags,
	pub comparator: Option<Comparator>,
}

impl ProviderEntry {
	pub fn new(name: impl Into<ProviderName>, flags: ProviderFlags) -> Self {
		Self {
			name: name.into(),
			flags,
			comparator: None,
		}
	}

	pub fn with_comparator(mut self, comparator: Comparator) -> Self {
		self.comparator = Some(comparator);
		self
	}
}

/// Explicit provider configuration shared by the scheduler and the mixer.
///
/// Entry order is the root order: the order providers are scheduled and
/// collected on the root state. The nested order defaults to the composable
/// entries in root order.
#[derive(Debug, Clone, Default)]
pub struct ProviderTable {
	entries: Vec<ProviderEntry>,
	nested: Option<Vec<ProviderName>>,
}

impl ProviderTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends an entry, replacing any previous entry with the same name.
	pub fn push(&mut self, entry: ProviderEntry) {
		self.entries.retain(|e| e.name != entry.name);
		self.entries.push(entry);
	}

	pub fn with(mut self, entry: ProviderEntry) -> Self {
		self.push(entry);
		self
	}

	/// Overrides the collection order used on non-root states.
	pub fn with_nested_order(mut self, order: impl IntoIterator<Item = ProviderName>) -> Self {
		self.nested = Some(order.into_iter().collect());
		self
	}

	pub fn get(&self, name: &ProviderName) -> Option<&ProviderEntry> {
		self.entries.iter().find(|e| &e.name == name)
	}

	pub fn entries(&self) -> &[ProviderEntry] {
		&self.entries
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn root_order(&self) -> impl Iterator<Item = &ProviderName> {
		self.entries.iter().map(|e| &e.name)
	}

	pub fn nested_order(&self) -> Box<dyn Iterator<Item = &ProviderName> + '_> {
		match &self.nested {
			Some(order) => Box::new(order.iter()),
			None => Box::new(self.with_flag(ProviderFlags::COMPOSE)),
		}
	}

	pub fn blocking(&self) -> impl Iterator<Item = &ProviderName> {
		self.with_flag(ProviderFlags::BLOCKING)
	}

	pub fn speculative(&self) -> impl Iterator<Item = &ProviderName> {
		self.with_flag(ProviderFlags::SPECULATE)
	}

	/// Providers scheduled on a state at `depth`.
	pub fn for_depth(&self, depth: usize) -> Box<dyn Iterator<Item = &ProviderName> + '_> {
		if depth == 0 {
			Box::new(self.root_order())
		} else {
			Box::new(self.speculative())
		}
	}

	pub fn comparator(&self, name: &ProviderName) -> Option<Comparator> {
		self.get(name).and_then(|e| e.comparator)
	}

	pub fn is_smart(&self, name: &ProviderName) -> bool {
		self.get(name).is_some_and(|e| e.flags.contains(ProviderFlags::SMART))
	}

	fn with_flag(&self, flag: ProviderFlags) -> impl Iterator<Item = &ProviderName> {
		self.entries.iter().filter(move |e| e.flags.contains(flag)).map(|e| &e.name)
	}
}

/// Provider table plus the provider implementations it names.
pub struct ProviderRegistry<A: Analyzer> {
	table: Arc<ProviderTable>,
	providers: HashMap<ProviderName, Arc<dyn Provider<A>>>,
}

impl<A: Analyzer> Default for ProviderRegistry<A> {
	fn default() -> Self {
		Self {
			table: Arc::default(),
			providers: HashMap::new(),
		}
	}
}

impl<A: Analyzer> ProviderRegistry<A> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `provider` under its own name with the given roles.
	pub fn register(&mut self, provider: impl Provider<A> + 'static, flags: ProviderFlags) -> &mut ProviderEntry {
		let provider: Arc<dyn Provider<A>> = Arc::new(provider);
		let name = provider.name();
		let table = Arc::make_mut(&mut self.table);
		table.push(ProviderEntry::new(name.clone(), flags));
		self.providers.insert(name, provider);
		let last = table.entries.len() - 1;
		&mut table.entries[last]
	}

	pub fn with(mut self, provider: impl Provider<A> + 'static, flags: ProviderFlags) -> Self {
		self.register(provider, flags);
		self
	}

	/// Like [`ProviderRegistry::with`], also installing a comparator.
	pub fn with_comparator(mut self, provider: impl Provider<A> + 'static, flags: ProviderFlags, comparator: Comparator) -> Self {
		self.register(provider, flags).comparator = Some(comparator);
		self
	}

	pub fn set_nested_order(&mut self, order: impl IntoIterator<Item = ProviderName>) {
		let table = Arc::make_mut(&mut self.table);
		table.nested = Some(order.into_iter().collect());
	}

	pub fn table(&self) -> &Arc<ProviderTable> {
		&self.table
	}

	pub fn provider(&self, name: &ProviderName) -> Option<&Arc<dyn Provider<A>>> {
		self.providers.get(name)
	}
}
