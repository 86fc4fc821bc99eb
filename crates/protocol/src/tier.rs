//! Capability tiers of the compiler resource.

use std::fmt;

use bitflags::bitflags;

bitflags! {
	/// Capability flags gating one-time upgrades of the compiler resource.
	///
	/// Flags only ever get added: a tier built for `CJK | EMOJI` serves every
	/// request that needs a subset of those flags.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct ResourceTier: u8 {
		/// Simplified Chinese glyph coverage.
		const CJK = 1;
		/// Color emoji and symbol coverage.
		const EMOJI = 1 << 1;
	}
}

impl ResourceTier {
	/// Base tier: core fonts only.
	pub const BASE: Self = Self::empty();

	/// Inspects source text for code points that need an extended tier.
	pub fn detect(text: &str) -> Self {
		let mut tier = Self::BASE;
		for ch in text.chars() {
			let cp = u32::from(ch);
			if (0x4E00..=0x9FA5).contains(&cp) {
				tier |= Self::CJK;
			} else if cp > 0xFFFF || (0x2600..=0x27BF).contains(&cp) {
				tier |= Self::EMOJI;
			}
			if tier.is_all() {
				break;
			}
		}
		tier
	}
}

impl fmt::Display for ResourceTier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_empty() {
			return f.write_str("base");
		}
		let mut first = true;
		for (name, _) in self.iter_names() {
			if !first {
				f.write_str("+")?;
			}
			f.write_str(&name.to_ascii_lowercase())?;
			first = false;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plain_latin_needs_base_tier() {
		assert_eq!(ResourceTier::detect("= Title\nHello *world*"), ResourceTier::BASE);
	}

	#[test]
	fn detects_cjk_and_emoji() {
		assert_eq!(ResourceTier::detect("你好"), ResourceTier::CJK);
		assert_eq!(ResourceTier::detect("done \u{2705}"), ResourceTier::EMOJI);
		assert_eq!(ResourceTier::detect("\u{1F600}"), ResourceTier::EMOJI);
		assert_eq!(ResourceTier::detect("中文 \u{1F680}"), ResourceTier::CJK | ResourceTier::EMOJI);
	}

	#[test]
	fn cjk_range_upper_bound_is_exclusive_of_extension_block() {
		assert_eq!(ResourceTier::detect("\u{9FA6}"), ResourceTier::BASE);
	}

	#[test]
	fn display_lists_enabled_flags() {
		assert_eq!(ResourceTier::BASE.to_string(), "base");
		assert_eq!((ResourceTier::CJK | ResourceTier::EMOJI).to_string(), "cjk+emoji");
	}
}
