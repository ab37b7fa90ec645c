//! Tag helper descriptors.
//!
//! A [`TagHelperDescriptor`] describes one template extension point: which
//! elements it applies to, which attributes it binds and which children it
//! allows. Descriptors are immutable once produced and are compared by
//! [`Checksum`] everywhere in the resolver.

use serde::{Deserialize, Serialize};
use sprig_checksum::{Checksum, ChecksumBuilder, Checksummed};

/// Kind string of tag helpers implemented as classes.
pub const TAG_HELPER_KIND: &str = "ITagHelper";

/// Element structure a matching rule requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TagStructure {
	#[default]
	Unspecified,
	NormalOrSelfClosing,
	WithoutEndTag,
}

/// How a required attribute's name is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NameComparison {
	#[default]
	FullMatch,
	PrefixMatch,
}

/// How a required attribute's value is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueComparison {
	#[default]
	None,
	FullMatch,
	PrefixMatch,
	SuffixMatch,
}

/// An attribute an element must carry for a rule to match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RequiredAttribute {
	pub name: String,
	pub name_comparison: NameComparison,
	pub value: Option<String>,
	pub value_comparison: ValueComparison,
}

/// One way an element can be matched by a tag helper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TagMatchingRule {
	/// Element name, or `*` for any.
	pub tag_name: String,
	pub parent_tag: Option<String>,
	pub tag_structure: TagStructure,
	pub case_sensitive: bool,
	pub attributes: Vec<RequiredAttribute>,
}

/// An attribute bound to a property of the tag helper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BoundAttribute {
	pub name: String,
	pub type_name: String,
	pub property_name: String,
	pub documentation: Option<String>,
	pub is_enum: bool,
	pub is_editor_required: bool,
	/// Prefix for dictionary-style attributes (`asp-route-*`).
	pub indexer_name_prefix: Option<String>,
	pub indexer_type_name: Option<String>,
}

/// A child element the tag helper permits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AllowedChildTag {
	pub name: String,
	pub display_name: String,
}

/// Metadata describing one tag helper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TagHelperDescriptor {
	pub kind: String,
	pub name: String,
	pub assembly_name: String,
	pub display_name: String,
	pub documentation: Option<String>,
	pub tag_output_hint: Option<String>,
	pub case_sensitive: bool,
	pub tag_matching_rules: Vec<TagMatchingRule>,
	pub bound_attributes: Vec<BoundAttribute>,
	pub allowed_child_tags: Vec<AllowedChildTag>,
	/// Ordered key/value pairs; order is part of identity.
	pub metadata: Vec<(String, String)>,
}

impl TagHelperDescriptor {
	/// Creates a class-based tag helper with no rules or attributes.
	pub fn new(name: impl Into<String>, assembly_name: impl Into<String>) -> Self {
		let name = name.into();
		Self {
			kind: TAG_HELPER_KIND.to_string(),
			display_name: name.clone(),
			name,
			assembly_name: assembly_name.into(),
			..Self::default()
		}
	}

	/// Adds a matching rule.
	pub fn with_rule(mut self, rule: TagMatchingRule) -> Self {
		self.tag_matching_rules.push(rule);
		self
	}

	/// Adds a bound attribute.
	pub fn with_attribute(mut self, attribute: BoundAttribute) -> Self {
		self.bound_attributes.push(attribute);
		self
	}

	/// Adds an allowed child tag.
	pub fn with_child(mut self, name: impl Into<String>) -> Self {
		let name = name.into();
		self.allowed_child_tags.push(AllowedChildTag {
			display_name: name.clone(),
			name,
		});
		self
	}

	/// Appends a metadata pair.
	pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.metadata.push((key.into(), value.into()));
		self
	}
}

impl Checksummed for TagHelperDescriptor {
	fn checksum(&self) -> Checksum {
		let mut b = ChecksumBuilder::new();
		b.append(&self.kind)
			.append(&self.name)
			.append(&self.assembly_name)
			.append(&self.display_name)
			.append(&self.documentation)
			.append(&self.tag_output_hint)
			.append(self.case_sensitive);

		b.append(self.tag_matching_rules.len());
		for rule in &self.tag_matching_rules {
			b.append(&rule.tag_name)
				.append(&rule.parent_tag)
				.append(rule.tag_structure as u32)
				.append(rule.case_sensitive)
				.append(rule.attributes.len());
			for attr in &rule.attributes {
				b.append(&attr.name)
					.append(attr.name_comparison as u32)
					.append(&attr.value)
					.append(attr.value_comparison as u32);
			}
		}

		b.append(self.bound_attributes.len());
		for attr in &self.bound_attributes {
			b.append(&attr.name)
				.append(&attr.type_name)
				.append(&attr.property_name)
				.append(&attr.documentation)
				.append(attr.is_enum)
				.append(attr.is_editor_required)
				.append(&attr.indexer_name_prefix)
				.append(&attr.indexer_type_name);
		}

		b.append(self.allowed_child_tags.len());
		for child in &self.allowed_child_tags {
			b.append(&child.name).append(&child.display_name);
		}

		b.append(self.metadata.len());
		for (key, value) in &self.metadata {
			b.append(key).append(value);
		}
		b.finish()
	}
}
