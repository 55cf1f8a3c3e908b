// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bit-packed serialization of the bake result.

use crate::bake::UsageGrid;
use crate::desc::{BakeInput, Format};
use crate::state::SpecialIndex;
use crate::workitem::WorkItem;
use crate::Error;
use omm_common::bird::{self, MAX_SUBDIVISION_LEVEL};

/// Describes one micromap inside the packed array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OmmDesc {
    /// The subdivision level of the micromap.
    pub subdivision_level: u16,
    /// The serialized state layout.
    pub format: Format,
    /// Byte offset of the first state into the packed array.
    pub offset: u32,
}

/// One bucket of a usage histogram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistogramEntry {
    /// The number of micromaps (array histogram) or referencing primitives
    /// (index histogram) in this bucket.
    pub count: u32,
    /// The subdivision level of the bucket.
    pub subdivision_level: u16,
    /// The format of the bucket.
    pub format: Format,
}

/// The element width of the output index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexFormat {
    /// 16-bit signed entries.
    I16,
    /// 32-bit signed entries.
    I32,
}

/// The per-primitive index buffer of a bake result.
///
/// Entries at or above zero index the descriptor array; negative entries are
/// [`SpecialIndex`] sentinels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexData {
    /// 16-bit entries; used whenever the triangle count permits it.
    I16(Vec<i16>),
    /// 32-bit entries.
    I32(Vec<i32>),
}

impl IndexData {
    /// The element width of the buffer.
    #[inline]
    pub fn format(&self) -> IndexFormat {
        match self {
            Self::I16(_) => IndexFormat::I16,
            Self::I32(_) => IndexFormat::I32,
        }
    }

    /// The number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
        }
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry for primitive `i`, widened to 32 bits.
    #[inline]
    pub fn get(&self, i: usize) -> i32 {
        match self {
            Self::I16(v) => i32::from(v[i]),
            Self::I32(v) => v[i],
        }
    }

    /// The raw bytes of the buffer, as consumed by runtime APIs.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::I16(v) => bytemuck::cast_slice(v),
            Self::I32(v) => bytemuck::cast_slice(v),
        }
    }
}

/// Everything a bake produces. The result owns all of its buffers.
#[derive(Clone, Debug, PartialEq)]
pub struct BakeOutput {
    /// The packed micromap states.
    pub array_data: Vec<u8>,
    /// One descriptor per materialized micromap, in serialization order.
    pub descriptors: Vec<OmmDesc>,
    /// One entry per input primitive.
    pub indices: IndexData,
    /// Micromap counts per (format, level) bucket.
    pub array_histogram: Vec<HistogramEntry>,
    /// Primitive counts per (format, level) bucket.
    pub index_histogram: Vec<HistogramEntry>,
}

/// The packed size of one micromap; offsets stay at least byte-aligned.
#[inline]
fn payload_bytes(subdivision_level: u32, format: Format) -> u64 {
    let bits = u64::from(bird::micro_triangle_count(subdivision_level)) * u64::from(format.bits_per_state());
    (bits >> 3).max(1)
}

/// Pack the surviving work items into the final output buffers.
pub(crate) fn serialize(
    input: &BakeInput<'_>,
    items: &mut [WorkItem],
    array_histogram: &UsageGrid,
    index_histogram: &UsageGrid,
    order: &[(u64, u32)],
) -> Result<BakeOutput, Error> {
    // Size the descriptor and state arrays from the histogram.
    let mut desc_count = 0_usize;
    let mut data_size = 0_u64;
    for format in [Format::OC1_2State, Format::OC1_4State] {
        for level in 0..=MAX_SUBDIVISION_LEVEL {
            let count = array_histogram.get(format, level);
            desc_count += count as usize;
            data_size += u64::from(count) * payload_bytes(level, format);
        }
    }
    if data_size > u64::from(u32::MAX) {
        return Err(Error::ArrayDataOverflow);
    }

    let mut array_data = vec![0_u8; data_size as usize];
    let mut descriptors = Vec::with_capacity(desc_count);

    // Walk in sort order, assigning descriptor slots and byte ranges.
    let mut offset = 0_u32;
    for &(_, item_index) in order {
        let item = &mut items[item_index as usize];
        if item.special_index.is_some() {
            continue;
        }
        item.desc_index = descriptors.len() as u32;
        descriptors.push(OmmDesc {
            subdivision_level: item.subdivision_level as u16,
            format: item.format,
            offset,
        });

        let micro_triangles = bird::micro_triangle_count(item.subdivision_level);
        let payload = &mut array_data[offset as usize..];
        for i in 0..micro_triangles {
            let state = item.states.get(i) as u8;
            match item.format {
                Format::OC1_2State => {
                    debug_assert!(state < 2);
                    payload[(i >> 3) as usize] |= state << (i & 7);
                }
                Format::OC1_4State => {
                    payload[(i >> 2) as usize] |= state << ((i & 3) << 1);
                }
            }
        }
        offset += payload_bytes(item.subdivision_level, item.format) as u32;
    }
    debug_assert_eq!(u64::from(offset), data_size);
    debug_assert_eq!(descriptors.len(), desc_count);

    // Primitives not owned by any work item (degenerate or disabled) keep the
    // initialization value.
    let triangle_count = input.triangle_count();
    let mut index_buffer = vec![SpecialIndex::FullyUnknownOpaque.value(); triangle_count];
    for item in items.iter() {
        let entry = match item.special_index {
            Some(special) => special.value(),
            None => item.desc_index as i32,
        };
        for &primitive in &item.primitives {
            index_buffer[primitive as usize] = entry;
        }
    }

    let can_compress = triangle_count <= i16::MAX as usize;
    let indices = if can_compress && !input.flags.force_32_bit_indices {
        IndexData::I16(index_buffer.into_iter().map(|v| v as i16).collect())
    } else {
        IndexData::I32(index_buffer)
    };

    Ok(BakeOutput {
        array_data,
        descriptors,
        indices,
        array_histogram: histogram_entries(array_histogram),
        index_histogram: histogram_entries(index_histogram),
    })
}

/// Flatten a usage grid into its sparse histogram form.
fn histogram_entries(grid: &UsageGrid) -> Vec<HistogramEntry> {
    let mut entries = Vec::new();
    for format in [Format::OC1_2State, Format::OC1_4State] {
        for level in 0..=MAX_SUBDIVISION_LEVEL {
            let count = grid.get(format, level);
            if count != 0 {
                entries.push(HistogramEntry {
                    count,
                    subdivision_level: level as u16,
                    format,
                });
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::UsageGrid;
    use crate::desc::{Indices, TexCoordFormat, TexCoords};
    use crate::state::{OpacityState, StateVec};
    use omm_common::geometry::Triangle;
    use omm_common::math::Vec2;
    use omm_common::texture::{AlphaTexture, MipDesc, TextureDesc, TilingMode};
    use smallvec::SmallVec;

    fn item(format: Format, level: u32, primitive: u32, states: &[OpacityState]) -> WorkItem {
        let mut v = StateVec::new(level);
        for (i, &s) in states.iter().enumerate() {
            v.set(i as u32, s);
        }
        WorkItem {
            subdivision_level: level,
            format,
            uv_tri: Triangle::new(Vec2::ZERO, Vec2::new(1., 0.), Vec2::new(0., 1.)),
            primitives: SmallVec::from_elem(primitive, 1),
            states: v,
            special_index: None,
            desc_index: 0,
        }
    }

    #[test]
    fn mixed_formats_pack_and_unpack() {
        use OpacityState::{Opaque as O, Transparent as T, UnknownOpaque as UO, UnknownTransparent as UT};

        let texture = AlphaTexture::new(&TextureDesc {
            mips: &[MipDesc {
                width: 1,
                height: 1,
                row_pitch: 0,
                data: &[1.],
            }],
            tiling: TilingMode::Linear,
        })
        .unwrap();
        static UVS: [f32; 6] = [0., 0., 1., 0., 0., 1.];
        let input = BakeInput::new(
            &texture,
            Indices::U32(&[0, 0, 0, 0, 0, 0]),
            TexCoords {
                format: TexCoordFormat::Uv32Float,
                data: bytemuck::cast_slice(&UVS),
                stride: 0,
            },
        );

        let two_state: Vec<OpacityState> =
            (0..16).map(|i| if i % 2 == 0 { O } else { T }).collect();
        let mut items = vec![
            item(Format::OC1_4State, 1, 0, &[O, T, UO, UT]),
            item(Format::OC1_2State, 2, 1, &two_state),
        ];

        let mut array = UsageGrid::default();
        array.add(Format::OC1_4State, 1, 1);
        array.add(Format::OC1_2State, 2, 1);
        let index = array;

        let order = vec![(0_u64, 0_u32), (0, 1)];
        let output = serialize(&input, &mut items, &array, &index, &order).unwrap();

        // One byte for the 4-state level-1 map, two for the 2-state level-2 map.
        assert_eq!(output.array_data, vec![0xB1, 0x55, 0x55]);
        assert_eq!(output.descriptors.len(), 2);
        assert_eq!(output.descriptors[0].offset, 0);
        assert_eq!(output.descriptors[1].offset, 1);
        assert_eq!(output.descriptors[1].format, Format::OC1_2State);
        assert_eq!(output.indices, IndexData::I16(vec![0, 1]));

        // Unpacking reproduces the 4-state array exactly.
        let payload = output.array_data[0];
        for (i, &expected) in [O, T, UO, UT].iter().enumerate() {
            let raw = (payload >> (2 * i)) & 3;
            assert_eq!(OpacityState::from_raw(raw), expected);
        }
    }

    #[test]
    fn payload_sizes() {
        assert_eq!(payload_bytes(0, Format::OC1_2State), 1);
        assert_eq!(payload_bytes(0, Format::OC1_4State), 1);
        assert_eq!(payload_bytes(1, Format::OC1_4State), 1);
        assert_eq!(payload_bytes(2, Format::OC1_2State), 2);
        assert_eq!(payload_bytes(2, Format::OC1_4State), 4);
        assert_eq!(payload_bytes(3, Format::OC1_2State), 8);
        assert_eq!(payload_bytes(12, Format::OC1_4State), 1 << 22);
    }

    #[test]
    fn four_state_bit_layout() {
        // States 0..=3 in the first byte: micro-triangle k sits at bits 2k.
        let states = [
            OpacityState::Transparent,
            OpacityState::Opaque,
            OpacityState::UnknownTransparent,
            OpacityState::UnknownOpaque,
        ];
        let mut byte = 0_u8;
        for (i, &s) in states.iter().enumerate() {
            byte |= (s as u8) << ((i & 3) << 1);
        }
        assert_eq!(byte, 0b11_10_01_00);
    }

    #[test]
    fn two_state_bit_layout() {
        let mut byte = 0_u8;
        for i in 0..8 {
            let s = if i % 3 == 0 {
                OpacityState::Opaque
            } else {
                OpacityState::Transparent
            };
            byte |= (s as u8) << (i & 7);
        }
        assert_eq!(byte, 0b0100_1001);
    }
}
