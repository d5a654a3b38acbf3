//! Shared builders for the integration tests.

#![allow(dead_code)]

use aperture_spirv::test_utils::ModuleBuilder;
use aperture_spirv::{DataType, Id, ScalarType, StorageClass};

pub fn f32_type(b: &mut ModuleBuilder) -> Id {
    b.ty(DataType::Scalar(ScalarType::F32))
}

pub fn u32_type(b: &mut ModuleBuilder) -> Id {
    b.ty(DataType::Scalar(ScalarType::U32))
}

pub fn vec4_type(b: &mut ModuleBuilder) -> Id {
    b.ty(DataType::Vector {
        scalar: ScalarType::F32,
        count: 4,
    })
}

pub fn pointer_to(b: &mut ModuleBuilder, pointee: Id, storage: StorageClass) -> Id {
    b.ty(DataType::Pointer { pointee, storage })
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
