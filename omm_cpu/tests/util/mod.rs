// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Utility functions shared across different tests.

use omm_cpu::{
    AlphaTexture, BakeInput, BakeOutput, Format, Indices, MipDesc, OmmDesc, OpacityState,
    TexCoordFormat, TexCoords, TextureDesc, TilingMode,
};

/// A texture from row-major alpha values.
pub fn texture(width: u32, height: u32, data: &[f32]) -> AlphaTexture {
    AlphaTexture::new(&TextureDesc {
        mips: &[MipDesc {
            width,
            height,
            row_pitch: 0,
            data,
        }],
        tiling: TilingMode::Linear,
    })
    .unwrap()
}

/// A `size`x`size` texture with the same alpha everywhere.
pub fn uniform_texture(size: u32, alpha: f32) -> AlphaTexture {
    texture(size, size, &vec![alpha; (size * size) as usize])
}

/// The 2x2 checkerboard: opaque at (0,0) and (1,1), transparent elsewhere.
pub fn checker2x2() -> AlphaTexture {
    texture(2, 2, &[1., 0., 0., 1.])
}

/// A bake input over `uvs` (consecutive primitives of three pairs each).
pub fn input_over<'a>(texture: &'a AlphaTexture, indices: &'a [u32], uvs: &'a [f32]) -> BakeInput<'a> {
    BakeInput::new(
        texture,
        Indices::U32(indices),
        TexCoords {
            format: TexCoordFormat::Uv32Float,
            data: bytemuck::cast_slice(uvs),
            stride: 0,
        },
    )
}

/// The packed size of one descriptor's payload.
pub fn payload_bytes(desc: &OmmDesc) -> usize {
    let count = 1_usize << (2 * desc.subdivision_level as usize);
    let bits = count
        * match desc.format {
            Format::OC1_2State => 1,
            Format::OC1_4State => 2,
        };
    (bits / 8).max(1)
}

/// Decode a descriptor's states back out of the packed array.
pub fn unpack_states(array_data: &[u8], desc: &OmmDesc) -> Vec<OpacityState> {
    let count = 1_u32 << (2 * desc.subdivision_level as u32);
    let payload = &array_data[desc.offset as usize..];
    (0..count)
        .map(|i| {
            let raw = match desc.format {
                Format::OC1_2State => (payload[(i >> 3) as usize] >> (i & 7)) & 1,
                Format::OC1_4State => (payload[(i >> 2) as usize] >> ((i & 3) << 1)) & 3,
            };
            OpacityState::from_raw(raw)
        })
        .collect()
}

/// Check the structural invariants every bake result must satisfy.
pub fn assert_output_invariants(output: &BakeOutput) {
    // Descriptor payloads tile the packed array exactly.
    let total: usize = output.descriptors.iter().map(payload_bytes).sum();
    assert_eq!(total, output.array_data.len());

    // Offsets are in bounds and consistent with the payload sizes.
    let mut expected_offset = 0_usize;
    for desc in &output.descriptors {
        assert_eq!(desc.offset as usize, expected_offset);
        expected_offset += payload_bytes(desc);
    }

    // Every index entry is a valid descriptor index or a special sentinel.
    for i in 0..output.indices.len() {
        let entry = output.indices.get(i);
        assert!(
            (entry >= 0 && (entry as usize) < output.descriptors.len()) || (-4..0).contains(&entry),
            "index entry {entry} out of range"
        );
    }

    // The array histogram counts exactly the materialized descriptors.
    let histogram_total: u32 = output.array_histogram.iter().map(|e| e.count).sum();
    assert_eq!(histogram_total as usize, output.descriptors.len());

    // No 2-state descriptor may store unknown states.
    for desc in &output.descriptors {
        if desc.format == Format::OC1_2State {
            for state in unpack_states(&output.array_data, desc) {
                assert!(state.is_known());
            }
        }
    }
}
