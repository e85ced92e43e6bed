//! The Trusted attribute: an optional, last-of-class-attributes
//! extension carrying a secondary constant pool, access control data
//! and a signed domain table, plus the canonicalisation recipe used
//! to build the byte stream an external signature provider hashes.
use std::ops::Range;

use crate::constant_pool::ConstantPool;
use crate::error::{ErrorContext, Result, TranslationError};

/// One non-default visibility override, keyed by field or method
/// index within its declaring class. The full table is sorted by
/// `member_index` ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityDelta {
    pub member_index: u16,
    pub visible: bool,
}

/// An opaque access key granted by a permit or domain table entry.
/// The key namespace is defined by the external signature provider;
/// this crate only orders and compares them.
pub type AccessKey = u32;

/// One entry of the domain table: an access key and the signature
/// over this class's canonicalised byte stream, attesting that the
/// holder of `key` is trusted to exercise the permits above it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEntry {
    pub key: AccessKey,
    pub signature: Vec<u8>,
}

/// The parsed Trusted attribute (JVM class-file extension, last of
/// the class attributes when present). Field and method visibility
/// defaults to `default_field_visibility`/`default_method_visibility`
/// except where overridden by a delta-table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustedAttribute {
    /// Secondary constant pool, same shape as the primary pool but
    /// with the `PublicKey`/`DigitalSignature` extension tags in use.
    pub pool: ConstantPool,
    pub access_flags: u16,
    pub subclass_access_key: AccessKey,
    pub class_resource_access_key: AccessKey,
    pub default_field_visibility: bool,
    pub default_method_visibility: bool,
    /// Sorted ascending by `member_index`.
    pub field_visibility_deltas: Vec<VisibilityDelta>,
    /// Sorted ascending by `member_index`.
    pub method_visibility_deltas: Vec<VisibilityDelta>,
    /// Sorted ascending.
    pub subclass_permits: Vec<AccessKey>,
    /// Sorted ascending.
    pub class_resource_access_permits: Vec<AccessKey>,
    /// Sorted ascending.
    pub reflective_class_resource_access_permits: Vec<AccessKey>,
    pub domain_table: Vec<DomainEntry>,
}

impl TrustedAttribute {
    /// Whether `member_index` is visible, honouring the delta table
    /// over the class's stated default.
    #[must_use]
    pub fn field_visible(&self, member_index: u16) -> bool {
        Self::lookup_visibility(&self.field_visibility_deltas, member_index).unwrap_or(self.default_field_visibility)
    }

    #[must_use]
    pub fn method_visible(&self, member_index: u16) -> bool {
        Self::lookup_visibility(&self.method_visibility_deltas, member_index).unwrap_or(self.default_method_visibility)
    }

    fn lookup_visibility(deltas: &[VisibilityDelta], member_index: u16) -> Option<bool> {
        deltas.binary_search_by_key(&member_index, |d| d.member_index).ok().map(|i| deltas[i].visible)
    }

    /// Whether `key` is a recognised subclass permit.
    #[must_use]
    pub fn grants_subclass_permit(&self, key: AccessKey) -> bool {
        self.subclass_permits.binary_search(&key).is_ok()
    }

    /// Finds the domain-table entry for `key`, if any trust domain was
    /// granted that key.
    #[must_use]
    pub fn domain_entry(&self, key: AccessKey) -> Option<&DomainEntry> {
        self.domain_table.iter().find(|entry| entry.key == key)
    }

    /// Verifies `key`'s domain signature against `digest` using the
    /// given provider, failing with [`TranslationError::Signature`] if
    /// the key has no domain entry or the provider rejects it.
    pub fn verify_domain(
        &self,
        key: AccessKey,
        digest: &[u8],
        public_key: &[u8],
        provider: &dyn SignatureProvider,
        context: ErrorContext,
    ) -> Result<()> {
        let entry = self.domain_entry(key).ok_or_else(|| TranslationError::Signature {
            message: format!("no domain entry for access key {key}"),
            context: context.clone(),
        })?;
        if provider.verify(digest, &entry.signature, public_key) {
            Ok(())
        } else {
            Err(TranslationError::Signature { message: format!("signature rejected for access key {key}"), context })
        }
    }
}

/// External collaborator verifying a permit or domain signature. The
/// hash algorithm and the RSA (or equivalent) verification itself are
/// out of scope here; this crate only produces the canonicalised
/// digest input the caller hashes before calling `verify`.
pub trait SignatureProvider {
    fn verify(&self, hash: &[u8], signature: &[u8], public_key: &[u8]) -> bool;
}

/// A raw class file together with the byte ranges needed to build the
/// Trusted attribute's digest input: the two count fields that must
/// be decremented, and the byte ranges of the `"Trusted"` UTF8
/// constant-pool entry and the Trusted attribute itself, both of
/// which are excluded from the hashed bytes.
///
/// `class_file.rs` records these ranges while parsing, since by the
/// time a `Klass` exists the raw bytes backing it are gone.
#[derive(Debug, Clone, Copy)]
pub struct DigestLayout {
    pub constant_pool_count_offset: usize,
    pub attributes_count_offset: usize,
    pub trusted_utf8_range: Range<usize>,
    pub trusted_attribute_range: Range<usize>,
}

/// Reproduces the exact canonicalised byte stream a Trusted class's
/// signature is computed over: the constant-pool-count and
/// attribute-count fields each decremented by one, and the `"Trusted"`
/// UTF8 entry plus the Trusted attribute's own bytes excised entirely.
///
/// The caller hashes the returned bytes with whatever digest the
/// signature provider expects; this function only builds the input.
///
/// # Panics
/// Panics if either count field offset does not point at a `u16`
/// within `class_file_bytes`, or if either excluded range is out of
/// bounds -- both indicate `layout` was not built from this exact
/// byte slice.
#[must_use]
pub fn digest_input(class_file_bytes: &[u8], layout: &DigestLayout) -> Vec<u8> {
    let mut bytes = class_file_bytes.to_vec();
    decrement_u16_at(&mut bytes, layout.constant_pool_count_offset);
    decrement_u16_at(&mut bytes, layout.attributes_count_offset);

    let mut excluded: Vec<Range<usize>> = vec![layout.trusted_utf8_range.clone(), layout.trusted_attribute_range.clone()];
    excluded.sort_by_key(|r| r.start);
    for range in excluded.into_iter().rev() {
        bytes.drain(range);
    }
    bytes
}

fn decrement_u16_at(bytes: &mut [u8], offset: usize) {
    let current = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
    let decremented = current - 1;
    let [hi, lo] = decremented.to_be_bytes();
    bytes[offset] = hi;
    bytes[offset + 1] = lo;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAccept;
    impl SignatureProvider for AlwaysAccept {
        fn verify(&self, _hash: &[u8], _signature: &[u8], _public_key: &[u8]) -> bool {
            true
        }
    }

    struct AlwaysReject;
    impl SignatureProvider for AlwaysReject {
        fn verify(&self, _hash: &[u8], _signature: &[u8], _public_key: &[u8]) -> bool {
            false
        }
    }

    fn attribute_with_domain(key: AccessKey, signature: Vec<u8>) -> TrustedAttribute {
        TrustedAttribute {
            pool: ConstantPool::parse(&mut crate::reader::ClassFileReader::new(&[0, 1]), 1).unwrap(),
            access_flags: 0,
            subclass_access_key: 0,
            class_resource_access_key: 0,
            default_field_visibility: true,
            default_method_visibility: true,
            field_visibility_deltas: vec![],
            method_visibility_deltas: vec![],
            subclass_permits: vec![],
            class_resource_access_permits: vec![],
            reflective_class_resource_access_permits: vec![],
            domain_table: vec![DomainEntry { key, signature }],
        }
    }

    #[test]
    fn visibility_delta_overrides_the_default() {
        let mut attr = attribute_with_domain(1, vec![]);
        attr.default_field_visibility = true;
        attr.field_visibility_deltas = vec![VisibilityDelta { member_index: 3, visible: false }];
        assert!(attr.field_visible(0));
        assert!(!attr.field_visible(3));
    }

    #[test]
    fn verify_domain_accepts_when_provider_accepts() {
        let attr = attribute_with_domain(42, vec![1, 2, 3]);
        let result = attr.verify_domain(42, b"digest", b"key", &AlwaysAccept, ErrorContext::new());
        assert!(result.is_ok());
    }

    #[test]
    fn verify_domain_rejects_when_provider_rejects() {
        let attr = attribute_with_domain(42, vec![1, 2, 3]);
        let result = attr.verify_domain(42, b"digest", b"key", &AlwaysReject, ErrorContext::new());
        assert!(matches!(result, Err(TranslationError::Signature { .. })));
    }

    #[test]
    fn verify_domain_rejects_missing_key() {
        let attr = attribute_with_domain(42, vec![1, 2, 3]);
        let result = attr.verify_domain(7, b"digest", b"key", &AlwaysAccept, ErrorContext::new());
        assert!(matches!(result, Err(TranslationError::Signature { .. })));
    }

    /// The digest input decrements both counts and excises the
    /// "Trusted" UTF8 entry and the attribute bytes, regardless of
    /// which excluded range appears first in the file.
    #[test]
    fn digest_input_decrements_counts_and_excises_trusted_bytes() {
        // Layout: [cp_count:u16][ATTR_COUNT placeholder not used][utf8 entry bytes][trusted attribute bytes][tail]
        let mut bytes = vec![0x00, 0x05]; // constant_pool_count = 5, at offset 0
        bytes.extend_from_slice(&[0x00, 0x02]); // attributes_count = 2, at offset 2
        let utf8_start = bytes.len();
        bytes.extend_from_slice(b"UTF8ENTRY");
        let utf8_end = bytes.len();
        let attr_start = bytes.len();
        bytes.extend_from_slice(b"TRUSTEDATTRBYTES");
        let attr_end = bytes.len();
        bytes.extend_from_slice(b"TAIL");

        let layout = DigestLayout {
            constant_pool_count_offset: 0,
            attributes_count_offset: 2,
            trusted_utf8_range: utf8_start..utf8_end,
            trusted_attribute_range: attr_start..attr_end,
        };
        let digest = digest_input(&bytes, &layout);
        assert_eq!(u16::from_be_bytes([digest[0], digest[1]]), 4);
        assert_eq!(u16::from_be_bytes([digest[2], digest[3]]), 1);
        assert!(!digest.windows(9).any(|w| w == b"UTF8ENTRY"));
        assert!(!digest.windows(16).any(|w| w == b"TRUSTEDATTRBYTES"));
        assert!(digest.windows(4).any(|w| w == b"TAIL"));
    }
}
