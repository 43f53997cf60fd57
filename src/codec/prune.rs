//! Stripping a unit down to a single self-contained message

use prost_types::FileDescriptorProto;

use crate::schema::Schema;

/// Build a unit holding only `schema`'s own definition.
///
/// Only meaningful for self-contained schemas: nested declarations, sibling
/// types and the dependency list are dropped. A nested message is lifted to
/// the top level, so the returned name may differ from `schema.full_name()`.
pub fn standalone_unit(schema: &Schema) -> (FileDescriptorProto, String) {
    let file = schema.file();
    let mut message = schema.descriptor_proto().clone();
    message.nested_type.clear();
    message.enum_type.clear();

    let lifted_name = match file.package() {
        "" => message.name().to_string(),
        package => format!("{package}.{}", message.name()),
    };

    let unit = FileDescriptorProto {
        name: file.name.clone(),
        package: file.package.clone(),
        syntax: file.syntax.clone(),
        options: file.options.clone(),
        message_type: vec![message],
        ..Default::default()
    };
    (unit, lifted_name)
}
