//! Item duplication for staff.
//!
//! A copy is made by writing the source through the codec and decoding the
//! bytes under a fresh serial, so every persisted field comes along and
//! nothing else does.

use thiserror::Error;

use crate::persist::{GenericReader, GenericWriter, PersistError, Serial};
use crate::world::geo::{Map, Point3D};
use crate::world::World;

#[derive(Debug, Error)]
pub enum DupeError {
    #[error("You can only dupe items.")]
    NotAnItem(Serial),

    #[error("entity {0} not found")]
    NotFound(Serial),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Where the staff member running the dupe stands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DupeOrigin {
    pub backpack: Option<Serial>,
    pub location: Point3D,
    pub map: Map,
}

/// Make `count` copies of `source` (at least one).
///
/// With `in_bag` the copies go into the source's own container, otherwise into
/// the invoker's backpack. Without a container they drop at the invoker's feet,
/// which is also where in-bag copies of a worn item go.
pub fn dupe_item(
    world: &mut World,
    source: Serial,
    count: i32,
    in_bag: bool,
    origin: &DupeOrigin,
) -> Result<Vec<Serial>, DupeError> {
    if world.mobile(source).is_some() {
        return Err(DupeError::NotAnItem(source));
    }
    let item = world.item(source).ok_or(DupeError::NotFound(source))?;
    let type_name = item.type_name();
    // a worn item's parent is its wearer, and copies must not be equipped
    let pack = if in_bag {
        item.item().parent.filter(|p| p.is_item())
    } else {
        origin.backpack
    };
    let mut w = GenericWriter::new();
    item.serialize(&mut w);
    let bytes = w.into_inner();

    let count = count.max(1) as usize;
    let mut copies = Vec::with_capacity(count);
    for _ in 0..count {
        let serial = world.next_item_serial()?;
        let mut r = GenericReader::new(&bytes);
        let mut copy = world.item_types().decode(type_name, serial, &mut r)?;
        r.expect_end()?;
        let core = copy.item_mut();
        core.parent = pack;
        if pack.is_none() {
            core.location = origin.location;
            core.map = origin.map;
        }
        copies.push(world.add_item(copy)?);
    }
    log::debug!("duped {} ({}) x{}", source, type_name, copies.len());
    Ok(copies)
}
