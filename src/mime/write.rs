//! Serialize a [`PartTree`] back to bytes.

use crate::mime::part::{PartId, PartTree};

/// Serialize the whole tree, starting at the root.
pub fn write_tree(tree: &PartTree) -> Vec<u8> {
    let mut out = Vec::new();
    write_part(tree, tree.root(), &mut out);
    out
}

/// Serialize one part and everything below it.
pub fn write_part(tree: &PartTree, id: PartId, out: &mut Vec<u8>) {
    for field in tree.fields(id) {
        out.extend_from_slice(field.name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(field.value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(tree.raw_body(id));

    let children = tree.children(id);
    if children.is_empty() {
        return;
    }

    // Rebuilt containers always carry a boundary
    let boundary = tree.boundary(id).unwrap_or_else(|| "=_mailcore_boundary".to_string());
    for &child in children {
        out.extend_from_slice(b"\r\n--");
        out.extend_from_slice(boundary.as_bytes());
        out.extend_from_slice(b"\r\n");
        write_part(tree, child, out);
    }
    out.extend_from_slice(b"\r\n--");
    out.extend_from_slice(boundary.as_bytes());
    out.extend_from_slice(b"--\r\n");
}
