// Specialization constants - packed data block + map entries
//
// A shader declares `layout (constant_id = N) const ...` values whose final
// value is supplied when the pipeline is created. The application hands the
// driver one contiguous data block plus an (id, offset, size) entry per
// constant. A layout mismatch here does not fail: it silently renders the
// wrong thing, so every block is validated when it is built.
//
// Layout used by this crate: every field is 4 bytes, fields are packed in
// declaration order, so field `i` lives at byte offset `4 * i`.

use ash::vk;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// Byte width of every field this builder emits
pub const FIELD_SIZE: u32 = 4;

/// `layout (constant_id = 5) const bool drawUserColor`
pub const DRAW_USER_COLOR_ID: u32 = 5;
/// `layout (constant_id = 7) const float r`
pub const RED_ID: u32 = 7;
/// `layout (constant_id = 8) const float g`
pub const GREEN_ID: u32 = 8;
/// `layout (constant_id = 9) const float b`
pub const BLUE_ID: u32 = 9;

/// Constant IDs the sample fragment shader declares, in declaration order
pub const FRAGMENT_CONSTANT_IDS: [u32; 4] = [DRAW_USER_COLOR_ID, RED_ID, GREEN_ID, BLUE_ID];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecializationError {
    #[error("specialization constant id {0} supplied more than once")]
    DuplicateId(u32),

    #[error("specialization constant id {0} is not declared by the shader module")]
    UndeclaredId(u32),

    #[error("specialization constant id {id}: shader declares {declared} bytes, block supplies {supplied}")]
    WidthMismatch { id: u32, declared: u32, supplied: u32 },

    #[error("field for id {id} spans bytes {offset}..{end} but the data block is {len} bytes")]
    OutOfRange { id: u32, offset: u32, end: u64, len: usize },

    #[error("fields for ids {first} and {second} overlap")]
    Overlap { first: u32, second: u32 },

    #[error("field for id {0} is zero bytes wide")]
    EmptyField(u32),
}

/// A single constant value as the application sees it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpecValue {
    /// Packed as a 32-bit unsigned integer (1 / 0). The in-memory size of a
    /// shader bool is target-defined, so it is never packed narrower.
    Bool(bool),
    F32(f32),
}

impl SpecValue {
    /// Encode into the 4 bytes the driver reads (host byte order)
    pub fn encode(self) -> [u8; 4] {
        match self {
            SpecValue::Bool(v) => u32::from(v).to_ne_bytes(),
            SpecValue::F32(v) => v.to_ne_bytes(),
        }
    }
}

impl From<bool> for SpecValue {
    fn from(v: bool) -> Self {
        SpecValue::Bool(v)
    }
}

impl From<f32> for SpecValue {
    fn from(v: f32) -> Self {
        SpecValue::F32(v)
    }
}

/// One constant slot in a data block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecializationField {
    /// Matches `constant_id` in the shader
    pub id: u32,
    pub offset: u32,
    pub size: u32,
}

impl SpecializationField {
    /// Exclusive end of the byte range (u64 so it can't wrap)
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.size)
    }
}

impl From<SpecializationField> for vk::SpecializationMapEntry {
    fn from(field: SpecializationField) -> Self {
        vk::SpecializationMapEntry {
            constant_id: field.id,
            offset: field.offset,
            size: field.size as usize,
        }
    }
}

/// A constant as declared by a shader module (recovered by reflection)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredConstant {
    pub id: u32,
    /// Byte width of the declared scalar type
    pub size: u32,
}

/// Immutable, validated specialization data for one pipeline stage.
///
/// Invariants (checked at construction):
/// - every field is non-empty and lies inside `data`
/// - field byte ranges never overlap
/// - ids are unique
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecializationBlock {
    fields: Vec<SpecializationField>,
    data: Vec<u8>,
}

impl SpecializationBlock {
    /// Pack an ordered list of `(constant_id, value)` pairs
    pub fn from_values<V>(values: impl IntoIterator<Item = (u32, V)>) -> Result<Self, SpecializationError>
    where
        V: Into<SpecValue>,
    {
        let mut builder = SpecializationBuilder::new();
        for (id, value) in values {
            builder.push(id, value)?;
        }
        Ok(builder.build())
    }

    /// Validate an externally described layout
    pub fn from_parts(fields: Vec<SpecializationField>, data: Vec<u8>) -> Result<Self, SpecializationError> {
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.id) {
                return Err(SpecializationError::DuplicateId(field.id));
            }
            if field.size == 0 {
                return Err(SpecializationError::EmptyField(field.id));
            }
            if field.end() > data.len() as u64 {
                return Err(SpecializationError::OutOfRange {
                    id: field.id,
                    offset: field.offset,
                    end: field.end(),
                    len: data.len(),
                });
            }
        }

        // Once sorted by offset, any overlap shows up between neighbours
        let mut sorted: Vec<&SpecializationField> = fields.iter().collect();
        sorted.sort_by_key(|f| f.offset);
        for pair in sorted.windows(2) {
            if pair[0].end() > u64::from(pair[1].offset) {
                return Err(SpecializationError::Overlap { first: pair[0].id, second: pair[1].id });
            }
        }

        Ok(Self { fields, data })
    }

    pub fn fields(&self) -> &[SpecializationField] {
        &self.fields
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The constant IDs this block addresses, in declaration order
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.fields.iter().map(|f| f.id)
    }

    /// Read back the 32-bit word at `index` (host byte order)
    pub fn word(&self, index: usize) -> Option<u32> {
        let start = index.checked_mul(4)?;
        let bytes = self.data.get(start..start.checked_add(4)?)?;
        Some(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn map_entries(&self) -> Vec<vk::SpecializationMapEntry> {
        self.fields.iter().copied().map(Into::into).collect()
    }

    /// Build the Vulkan view of this block.
    ///
    /// `entries` must come from [`Self::map_entries`]; the returned builder
    /// borrows both, so keep them alive until pipeline creation returns.
    pub fn info<'a>(&'a self, entries: &'a [vk::SpecializationMapEntry]) -> vk::SpecializationInfoBuilder<'a> {
        vk::SpecializationInfo::builder()
            .map_entries(entries)
            .data(&self.data)
    }

    /// Check every emitted constant against what the shader declares
    pub fn verify_declared(&self, declared: &[DeclaredConstant]) -> Result<(), SpecializationError> {
        for field in &self.fields {
            let decl = declared
                .iter()
                .find(|d| d.id == field.id)
                .ok_or(SpecializationError::UndeclaredId(field.id))?;

            if decl.size != field.size {
                return Err(SpecializationError::WidthMismatch {
                    id: field.id,
                    declared: decl.size,
                    supplied: field.size,
                });
            }
        }
        Ok(())
    }
}

/// Appends 4-byte fields in declaration order
#[derive(Debug, Default)]
pub struct SpecializationBuilder {
    fields: Vec<SpecializationField>,
    data: Vec<u8>,
}

impl SpecializationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one constant. A repeated id is rejected, never overwritten.
    pub fn push(&mut self, id: u32, value: impl Into<SpecValue>) -> Result<&mut Self, SpecializationError> {
        if self.fields.iter().any(|f| f.id == id) {
            return Err(SpecializationError::DuplicateId(id));
        }

        let len = self.data.len();
        let offset = u32::try_from(len).map_err(|_| SpecializationError::OutOfRange {
            id,
            offset: u32::MAX,
            end: len as u64 + u64::from(FIELD_SIZE),
            len,
        })?;

        self.data.extend_from_slice(&value.into().encode());
        self.fields.push(SpecializationField { id, offset, size: FIELD_SIZE });
        Ok(self)
    }

    pub fn build(self) -> SpecializationBlock {
        SpecializationBlock {
            fields: self.fields,
            data: self.data,
        }
    }
}

/// Which constants the sample specializes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpecializationMode {
    /// Shader defaults: textured cube
    None,
    /// Only the flag: black cube (color constants stay 0.0)
    FlagOnly,
    /// Flag and RGB: cube in the user color
    #[default]
    FullColor,
}

/// Build the fragment-stage block for one of the sample's scenarios
pub fn fragment_block(
    mode: SpecializationMode,
    draw_user_color: bool,
    user_color: [f32; 3],
) -> Result<SpecializationBlock, SpecializationError> {
    let mut builder = SpecializationBuilder::new();
    match mode {
        SpecializationMode::None => {}
        SpecializationMode::FlagOnly => {
            builder.push(DRAW_USER_COLOR_ID, draw_user_color)?;
        }
        SpecializationMode::FullColor => {
            builder
                .push(DRAW_USER_COLOR_ID, draw_user_color)?
                .push(RED_ID, user_color[0])?
                .push(GREEN_ID, user_color[1])?
                .push(BLUE_ID, user_color[2])?;
        }
    }

    let block = builder.build();
    log::debug!(
        "Fragment specialization ({:?}): ids {:?}, {} bytes",
        mode,
        block.ids().collect::<Vec<_>>(),
        block.data().len()
    );
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn declared_sample_constants() -> Vec<DeclaredConstant> {
        FRAGMENT_CONSTANT_IDS
            .iter()
            .map(|&id| DeclaredConstant { id, size: 4 })
            .collect()
    }

    #[test]
    fn no_specialization_is_empty() {
        let block = fragment_block(SpecializationMode::None, true, [1.0, 1.0, 1.0]).unwrap();
        assert!(block.is_empty());
        assert!(block.data().is_empty());
        assert!(block.map_entries().is_empty());

        let entries = block.map_entries();
        let info = block.info(&entries);
        assert_eq!(info.map_entry_count, 0);
        assert_eq!(info.data_size, 0);
    }

    #[test]
    fn flag_only_packs_one_word() {
        let block = SpecializationBlock::from_values([(5, true)]).unwrap();
        assert_eq!(block.data().len(), 4);
        assert_eq!(block.word(0), Some(1));
        assert_eq!(block.fields(), &[SpecializationField { id: 5, offset: 0, size: 4 }]);
    }

    #[test]
    fn full_color_matches_blue_cube_layout() {
        let block = fragment_block(SpecializationMode::FullColor, true, [0.0, 0.0, 1.0]).unwrap();
        assert_eq!(block.data().len(), 16);
        assert_eq!(block.word(0), Some(1));
        assert_eq!(block.word(1), Some(0));
        assert_eq!(block.word(2), Some(0));
        assert_eq!(block.word(3), Some(1.0f32.to_bits()));
        assert_eq!(block.word(4), None);

        let offsets: Vec<_> = block.fields().iter().map(|f| (f.id, f.offset, f.size)).collect();
        assert_eq!(offsets, vec![(5, 0, 4), (7, 4, 4), (8, 8, 4), (9, 12, 4)]);

        let entries = block.map_entries();
        let info = block.info(&entries);
        assert_eq!(info.map_entry_count, 4);
        assert_eq!(info.data_size, 16);
        assert_eq!(entries[3].constant_id, BLUE_ID);
        assert_eq!(entries[3].offset, 12);
        assert_eq!(entries[3].size, 4);
    }

    #[test]
    fn flag_only_preset_ignores_color() {
        let block = fragment_block(SpecializationMode::FlagOnly, false, [0.5, 0.5, 0.5]).unwrap();
        assert_eq!(block.ids().collect::<Vec<_>>(), vec![DRAW_USER_COLOR_ID]);
        assert_eq!(block.word(0), Some(0));
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let err = SpecializationBlock::from_values([
            (5, SpecValue::Bool(true)),
            (5, SpecValue::Bool(false)),
        ])
        .unwrap_err();
        assert_eq!(err, SpecializationError::DuplicateId(5));

        let mut builder = SpecializationBuilder::new();
        builder.push(7, 0.25f32).unwrap();
        assert_eq!(builder.push(7, 0.5f32).unwrap_err(), SpecializationError::DuplicateId(7));
        // The first value survives
        assert_eq!(builder.build().word(0), Some(0.25f32.to_bits()));
    }

    #[test]
    fn from_parts_rejects_out_of_range() {
        let fields = vec![SpecializationField { id: 1, offset: 4, size: 4 }];
        let err = SpecializationBlock::from_parts(fields, vec![0; 6]).unwrap_err();
        assert_eq!(err, SpecializationError::OutOfRange { id: 1, offset: 4, end: 8, len: 6 });
    }

    #[test]
    fn from_parts_rejects_overlap() {
        let fields = vec![
            SpecializationField { id: 1, offset: 0, size: 8 },
            SpecializationField { id: 2, offset: 12, size: 4 },
            SpecializationField { id: 3, offset: 4, size: 4 },
        ];
        let err = SpecializationBlock::from_parts(fields, vec![0; 16]).unwrap_err();
        assert_eq!(err, SpecializationError::Overlap { first: 1, second: 3 });
    }

    #[test]
    fn from_parts_rejects_empty_fields() {
        let fields = vec![
            SpecializationField { id: 1, offset: 0, size: 4 },
            SpecializationField { id: 2, offset: 2, size: 0 },
        ];
        let err = SpecializationBlock::from_parts(fields, vec![0; 4]).unwrap_err();
        assert_eq!(err, SpecializationError::EmptyField(2));
    }

    #[test]
    fn from_parts_rejects_duplicate_id() {
        let fields = vec![
            SpecializationField { id: 7, offset: 0, size: 4 },
            SpecializationField { id: 7, offset: 4, size: 4 },
        ];
        let err = SpecializationBlock::from_parts(fields, vec![0; 8]).unwrap_err();
        assert_eq!(err, SpecializationError::DuplicateId(7));
    }

    #[test]
    fn from_parts_accepts_unordered_tiling() {
        let fields = vec![
            SpecializationField { id: 9, offset: 4, size: 4 },
            SpecializationField { id: 3, offset: 0, size: 4 },
        ];
        let block = SpecializationBlock::from_parts(fields, vec![0; 8]).unwrap();
        assert_eq!(block.ids().collect::<Vec<_>>(), vec![9, 3]);
    }

    #[test]
    fn verify_accepts_sample_shader() {
        let block = fragment_block(SpecializationMode::FullColor, true, [0.0, 0.0, 1.0]).unwrap();
        block.verify_declared(&declared_sample_constants()).unwrap();
    }

    #[test]
    fn verify_reports_undeclared_id() {
        let block = SpecializationBlock::from_values([(5, true), (6, false)]).unwrap();
        assert_eq!(
            block.verify_declared(&declared_sample_constants()).unwrap_err(),
            SpecializationError::UndeclaredId(6)
        );
    }

    #[test]
    fn verify_reports_width_mismatch() {
        let block = SpecializationBlock::from_values([(7, 1.0f32)]).unwrap();
        let declared = [DeclaredConstant { id: 7, size: 8 }];
        assert_eq!(
            block.verify_declared(&declared).unwrap_err(),
            SpecializationError::WidthMismatch { id: 7, declared: 8, supplied: 4 }
        );
    }

    #[test]
    fn negative_zero_and_nan_survive() {
        let nan = f32::from_bits(0x7fc0_1234);
        let block = SpecializationBlock::from_values([(0, -0.0f32), (1, nan)]).unwrap();
        assert_eq!(block.word(0), Some((-0.0f32).to_bits()));
        assert_eq!(block.word(1), Some(0x7fc0_1234));
    }

    fn spec_value() -> impl Strategy<Value = SpecValue> {
        prop_oneof![
            any::<bool>().prop_map(SpecValue::Bool),
            any::<u32>().prop_map(|bits| SpecValue::F32(f32::from_bits(bits))),
        ]
    }

    proptest! {
        #[test]
        fn fields_tile_the_buffer(
            ids in proptest::collection::hash_set(any::<u32>(), 0..24),
            seed in proptest::collection::vec(spec_value(), 24),
        ) {
            let values: Vec<(u32, SpecValue)> = ids.into_iter().zip(seed).collect();
            let block = SpecializationBlock::from_values(values.clone()).unwrap();

            prop_assert_eq!(block.data().len(), 4 * values.len());
            let mut cursor = 0u64;
            for (index, field) in block.fields().iter().enumerate() {
                prop_assert_eq!(field.id, values[index].0);
                prop_assert_eq!(u64::from(field.offset), cursor);
                prop_assert_eq!(field.size, 4);
                cursor = field.end();
            }
            prop_assert_eq!(cursor, block.data().len() as u64);

            // Any valid layout must also pass the external validator
            let again = SpecializationBlock::from_parts(block.fields().to_vec(), block.data().to_vec());
            prop_assert!(again.is_ok());
        }

        #[test]
        fn bool_encodes_as_one_or_zero(v in any::<bool>()) {
            let block = SpecializationBlock::from_values([(5, v)]).unwrap();
            prop_assert_eq!(block.word(0), Some(if v { 1 } else { 0 }));
        }

        #[test]
        fn float_bits_are_preserved(bits in any::<u32>()) {
            let block = SpecializationBlock::from_values([(7, f32::from_bits(bits))]).unwrap();
            prop_assert_eq!(block.word(0), Some(bits));
        }

        #[test]
        fn repeated_id_always_fails(id in any::<u32>(), a in spec_value(), b in spec_value()) {
            let result = SpecializationBlock::from_values([(id, a), (id, b)]);
            prop_assert_eq!(result.unwrap_err(), SpecializationError::DuplicateId(id));
        }
    }
}
