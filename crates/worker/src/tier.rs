//! Tiered compiler resource.
//!
//! The resource is built lazily on first use and rebuilt from scratch whenever
//! a request needs a flag the current tier lacks. A rebuild always targets the
//! union of the current and required flags, so tiers only grow.

use std::sync::Arc;

use folio_protocol::ResourceTier;
use serde::Deserialize;

use crate::{AssetLoader, EngineBuilder, EngineHandle, TierError};

const CORE_BUNDLES: &[&str] = &[
	"https://cdn.jsdelivr.net/gh/typst/typst-dev-assets@v0.13.1/files/fonts/IBMPlexSans-Regular.ttf",
	"https://cdn.jsdelivr.net/gh/typst/typst-dev-assets@v0.13.1/files/fonts/IBMPlexSans-Bold.ttf",
	"https://cdn.jsdelivr.net/gh/typst/typst-assets@v0.13.1/files/fonts/NewCMMath-Regular.otf",
	"https://cdn.jsdelivr.net/gh/typst/typst-assets@v0.13.1/files/fonts/NewCMMath-Book.otf",
];

const CJK_BUNDLES: &[&str] = &[
	"https://cdn.jsdelivr.net/gh/notofonts/noto-cjk@main/Sans/OTF/SimplifiedChinese/NotoSansCJKsc-Regular.otf",
	"https://cdn.jsdelivr.net/gh/notofonts/noto-cjk@main/Sans/OTF/SimplifiedChinese/NotoSansCJKsc-Bold.otf",
	"https://fonts.gstatic.com/s/notoserifsc/v35/H4cyBXePl9DZ0Xe7gG9cyOj7uK2-n-D2rd4FY7SCqyWv.ttf",
];

const EMOJI_BUNDLES: &[&str] = &["https://fonts.gstatic.com/s/notocoloremoji/v37/Yq6P-KqIXTD0t4D9z1ESnKM3-HpFab4.ttf"];

/// Bundle identifiers per capability flag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundlePlan {
	/// Always loaded.
	pub core: Vec<String>,
	/// Loaded when the tier has [`ResourceTier::CJK`].
	pub cjk: Vec<String>,
	/// Loaded when the tier has [`ResourceTier::EMOJI`].
	pub emoji: Vec<String>,
}

impl Default for BundlePlan {
	fn default() -> Self {
		let owned = |ids: &[&str]| ids.iter().map(|id| (*id).to_string()).collect();
		Self {
			core: owned(CORE_BUNDLES),
			cjk: owned(CJK_BUNDLES),
			emoji: owned(EMOJI_BUNDLES),
		}
	}
}

impl BundlePlan {
	/// Every bundle a resource of `tier` is built from, core first.
	pub fn bundles_for(&self, tier: ResourceTier) -> Vec<&str> {
		let mut ids: Vec<&str> = self.core.iter().map(String::as_str).collect();
		if tier.contains(ResourceTier::CJK) {
			ids.extend(self.cjk.iter().map(String::as_str));
		}
		if tier.contains(ResourceTier::EMOJI) {
			ids.extend(self.emoji.iter().map(String::as_str));
		}
		ids
	}
}

/// Owner of the compiler resource and its current tier.
///
/// Lives inside the worker task; nothing outside that task can reach it.
pub struct TierManager {
	loader: Arc<dyn AssetLoader>,
	builder: Arc<dyn EngineBuilder>,
	plan: Arc<BundlePlan>,
	tier: ResourceTier,
	engine: Option<EngineHandle>,
	rebuilds: u64,
}

impl TierManager {
	pub fn new(loader: Arc<dyn AssetLoader>, builder: Arc<dyn EngineBuilder>, plan: Arc<BundlePlan>) -> Self {
		Self {
			loader,
			builder,
			plan,
			tier: ResourceTier::BASE,
			engine: None,
			rebuilds: 0,
		}
	}

	/// Flags of the live resource.
	pub fn tier(&self) -> ResourceTier {
		self.tier
	}

	/// Returns `true` once a resource has been built.
	pub fn is_ready(&self) -> bool {
		self.engine.is_some()
	}

	/// Number of completed builds, the initial one included.
	pub fn rebuilds(&self) -> u64 {
		self.rebuilds
	}

	/// Returns an engine covering `required`, building one if needed.
	///
	/// On failure the previous engine and tier are kept, so a later request
	/// retries the same upgrade.
	pub async fn ensure_tier(&mut self, required: ResourceTier) -> Result<&mut EngineHandle, TierError> {
		let engine = match self.engine.take() {
			Some(engine) if self.tier.contains(required) => engine,
			previous => {
				let target = self.tier | required;
				tracing::info!(from = %self.tier, to = %target, "worker.tier.rebuild");
				match build_engine(self.loader.as_ref(), self.builder.as_ref(), &self.plan, target).await {
					Ok(engine) => {
						self.tier = target;
						self.rebuilds += 1;
						tracing::info!(tier = %target, rebuilds = self.rebuilds, "worker.tier.ready");
						engine
					}
					Err(err) => {
						self.engine = previous;
						return Err(err);
					}
				}
			}
		};
		Ok(self.engine.insert(engine))
	}
}

async fn build_engine(loader: &dyn AssetLoader, builder: &dyn EngineBuilder, plan: &BundlePlan, tier: ResourceTier) -> Result<EngineHandle, TierError> {
	let ids = plan.bundles_for(tier);
	let mut bundles = Vec::with_capacity(ids.len());
	for id in ids {
		let bundle = loader.load(id).await.map_err(|source| TierError::Asset { tier, source })?;
		bundles.push(bundle);
	}
	builder.build(tier, bundles).await.map_err(|source| TierError::Build { tier, source })
}
