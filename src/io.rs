//! Per-node persistence hook.
//!
//! A node is stored as its occupancy (4 bytes, little endian `f32`) followed
//! by the `r`, `g`, `b` bytes of its color. There is no length prefix and no
//! semantic data; labels do not survive a save and reload.

use std::io::{ Read, Write };
use crate::{ Result, SemanticVoxel, VoxelColor };

/// Bytes written per node.
pub const NODE_DATA_SIZE: usize = 7;

pub fn write_node<W: Write>(node: &SemanticVoxel, writer: &mut W) -> Result<()> {
    let mut buf = [0u8; NODE_DATA_SIZE];
    buf[..4].copy_from_slice(&node.occupancy.to_le_bytes());
    buf[4..].copy_from_slice(&[node.color.r, node.color.g, node.color.b]);
    writer.write_all(&buf)?;
    Ok(())
}

/// Overwrites `node`'s occupancy and color with the next record in `reader`.
/// Semantics and children are left untouched.
pub fn read_node<R: Read>(node: &mut SemanticVoxel, reader: &mut R) -> Result<()> {
    let mut buf = [0u8; NODE_DATA_SIZE];
    reader.read_exact(&mut buf)?;

    let mut occupancy = [0u8; 4];
    occupancy.copy_from_slice(&buf[..4]);
    node.occupancy = f32::from_le_bytes(occupancy);
    node.color = VoxelColor::new(buf[4], buf[5], buf[6]);
    Ok(())
}

#[test]
fn node_round_trip_drops_semantics() {
    use crate::SemanticPayload;

    let mut node = SemanticVoxel::with_occupancy(-0.85);
    node.fuse_color(VoxelColor::new(12, 34, 56));
    node.fuse_semantics(&[0.2, 0.8]);

    let mut bytes = Vec::new();
    write_node(&node, &mut bytes).unwrap();
    assert_eq!(bytes.len(), NODE_DATA_SIZE);
    assert_eq!(&bytes[4..], &[12, 34, 56]);

    let mut restored = SemanticVoxel::new();
    read_node(&mut restored, &mut bytes.as_slice()).unwrap();
    assert_eq!(restored.occupancy, -0.85);
    assert_eq!(restored.color, node.color);
    assert!(!restored.semantics.is_set());
}

#[test]
fn nodes_are_read_sequentially() {
    let mut bytes = Vec::new();
    for (occupancy, shade) in [(0.5, 10), (1.5, 20)] {
        let mut node = SemanticVoxel::with_occupancy(occupancy);
        node.color = VoxelColor::new(shade, shade, shade);
        write_node(&node, &mut bytes).unwrap();
    }

    let mut reader = bytes.as_slice();
    let mut node = SemanticVoxel::new();
    read_node(&mut node, &mut reader).unwrap();
    assert_eq!((node.occupancy, node.color), (0.5, VoxelColor::new(10, 10, 10)));
    read_node(&mut node, &mut reader).unwrap();
    assert_eq!((node.occupancy, node.color), (1.5, VoxelColor::new(20, 20, 20)));

    let err = read_node(&mut node, &mut reader).unwrap_err();
    assert!(matches!(err, crate::Error::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
}

#[test]
fn unset_color_round_trips() {
    let node = SemanticVoxel::new();
    let mut bytes = Vec::new();
    write_node(&node, &mut bytes).unwrap();
    assert_eq!(bytes, [0, 0, 0, 0, 255, 255, 255]);

    let mut restored = SemanticVoxel::with_occupancy(3.0);
    read_node(&mut restored, &mut bytes.as_slice()).unwrap();
    assert_eq!(restored, node);
}
