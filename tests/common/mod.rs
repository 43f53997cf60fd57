//! Shared fixtures: hand-built descriptors for `example.ExampleProto` and
//! prost mirrors that produce matching wire bytes.

#![allow(dead_code)]

use prost::Message;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    FileDescriptorSet,
};
use proto_filter::{
    FilterConfig, Resource, ReturnCode, RowFilter, SchemaRegistry, StaticDiscovery,
};

pub const FAMILY: &[u8] = b"d";
pub const QUALIFIER: &[u8] = b"v";

#[derive(Clone, PartialEq, prost::Message)]
pub struct ChildProto {
    #[prost(int32, optional, tag = "1")]
    pub child_proto_val: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum TestEnum {
    Apple = 0,
    Orange = 1,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ExampleProto {
    #[prost(int64, optional, tag = "1")]
    pub id: Option<i64>,
    #[prost(int32, optional, tag = "2")]
    pub portal_id: Option<i32>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
    #[prost(bool, optional, tag = "4")]
    pub bool_test: Option<bool>,
    #[prost(float, optional, tag = "5")]
    pub float_test: Option<f32>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub bytes_test: Option<Vec<u8>>,
    #[prost(int32, optional, tag = "7")]
    pub required_test: Option<i32>,
    #[prost(double, optional, tag = "8")]
    pub double_test: Option<f64>,
    #[prost(int32, optional, tag = "9")]
    pub default_test: Option<i32>,
    #[prost(enumeration = "TestEnum", optional, tag = "10")]
    pub test_enum: Option<i32>,
    #[prost(message, optional, tag = "11")]
    pub child_proto: Option<ChildProto>,
    #[prost(string, repeated, tag = "12")]
    pub tags: Vec<String>,
}

impl prost::Name for ExampleProto {
    const NAME: &'static str = "ExampleProto";
    const PACKAGE: &'static str = "example";
}

impl prost::Name for ChildProto {
    const NAME: &'static str = "ChildProto";
    const PACKAGE: &'static str = "example";
}

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn typed_field(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, ty)
    }
}

/// `example/fruit.proto`: the enum lives in its own unit so that
/// `ExampleProto` needs a cross-file closure.
pub fn fruit_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("example/fruit.proto".to_string()),
        package: Some("example".to_string()),
        syntax: Some("proto2".to_string()),
        enum_type: vec![EnumDescriptorProto {
            name: Some("TestEnum".to_string()),
            value: ["APPLE", "ORANGE"]
                .iter()
                .enumerate()
                .map(|(number, name)| EnumValueDescriptorProto {
                    name: Some(name.to_string()),
                    number: Some(number as i32),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn example_file() -> FileDescriptorProto {
    let child = DescriptorProto {
        name: Some("ChildProto".to_string()),
        field: vec![field("child_proto_val", 1, Type::Int32)],
        ..Default::default()
    };
    let example = DescriptorProto {
        name: Some("ExampleProto".to_string()),
        field: vec![
            field("id", 1, Type::Int64),
            field("portal_id", 2, Type::Int32),
            field("name", 3, Type::String),
            field("bool_test", 4, Type::Bool),
            field("float_test", 5, Type::Float),
            field("bytes_test", 6, Type::Bytes),
            FieldDescriptorProto {
                label: Some(Label::Required as i32),
                ..field("required_test", 7, Type::Int32)
            },
            field("double_test", 8, Type::Double),
            FieldDescriptorProto {
                default_value: Some("5".to_string()),
                ..field("default_test", 9, Type::Int32)
            },
            typed_field("test_enum", 10, Type::Enum, ".example.TestEnum"),
            typed_field("child_proto", 11, Type::Message, "ChildProto"),
            FieldDescriptorProto {
                label: Some(Label::Repeated as i32),
                ..field("tags", 12, Type::String)
            },
        ],
        ..Default::default()
    };
    FileDescriptorProto {
        name: Some("example/example.proto".to_string()),
        package: Some("example".to_string()),
        syntax: Some("proto2".to_string()),
        dependency: vec!["example/fruit.proto".to_string()],
        message_type: vec![example, child],
        ..Default::default()
    }
}

/// Both units, dependent first, as an unordered set would arrive
pub fn descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![example_file(), fruit_file()],
    }
}

pub fn descriptor_set_bytes() -> Vec<u8> {
    descriptor_set().encode_to_vec()
}

pub fn registry() -> SchemaRegistry {
    let discovery = StaticDiscovery::new(vec![Resource::new("example.desc", descriptor_set_bytes())]);
    SchemaRegistry::new(discovery, &FilterConfig::default())
}

/// The message most scalar tests run against
pub fn sample() -> ExampleProto {
    ExampleProto {
        id: Some(2),
        portal_id: Some(7),
        name: Some("contains test contains".to_string()),
        bool_test: Some(true),
        float_test: Some(1.3),
        bytes_test: Some(b"abc".to_vec()),
        required_test: Some(1),
        double_test: Some(2.5),
        test_enum: Some(TestEnum::Orange as i32),
        child_proto: Some(ChildProto {
            child_proto_val: Some(5),
        }),
        ..Default::default()
    }
}

pub fn with_id(id: i64) -> ExampleProto {
    ExampleProto {
        id: Some(id),
        required_test: Some(1),
        ..Default::default()
    }
}

/// Drive one row through `filter` the way a host store would and return the
/// row's verdict.
pub fn run_row<F: RowFilter>(filter: &mut F, cells: &[(&[u8], &[u8], Vec<u8>)]) -> bool {
    filter.reset();
    for (family, qualifier, value) in cells {
        match filter.on_value(family, qualifier, value).unwrap() {
            ReturnCode::Include => {}
            ReturnCode::IncludeAndStopRow | ReturnCode::SkipRow => break,
        }
    }
    filter.row_verdict()
}

/// A row holding one value of the filtered column
pub fn cell<M: Message>(message: &M) -> Vec<(&'static [u8], &'static [u8], Vec<u8>)> {
    vec![(FAMILY, QUALIFIER, message.encode_to_vec())]
}
