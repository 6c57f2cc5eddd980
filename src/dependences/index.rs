use super::{FrameId, StorageLocation};
use crate::trace::{Instance, ObjectId};
use std::collections::{BTreeSet, HashMap};

/// Entries removed from a [`LocationIndex`] in bulk, sorted by location
#[derive(Debug, Default)]
pub struct Evicted {
    pub writers: Vec<(StorageLocation, Instance)>,
    pub readers: Vec<(StorageLocation, Vec<Instance>)>,
}

impl Evicted {
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty() && self.readers.is_empty()
    }
}

/// Last writer and last readers of every tracked location
///
/// Locations are also indexed by the object or frame they belong to, so that creating an object
/// or destroying a frame can evict all of its locations at once.
#[derive(Debug, Default)]
pub struct LocationIndex {
    last_writer: HashMap<StorageLocation, Instance>,
    last_readers: HashMap<StorageLocation, Vec<Instance>>,
    by_object: HashMap<ObjectId, BTreeSet<StorageLocation>>,
    by_frame: HashMap<FrameId, BTreeSet<StorageLocation>>,
}

impl LocationIndex {
    pub fn new() -> LocationIndex {
        LocationIndex::default()
    }

    fn track(&mut self, location: StorageLocation) {
        if let Some(object) = location.object() {
            self.by_object.entry(object).or_default().insert(location);
        } else if let Some(frame) = location.frame() {
            self.by_frame.entry(frame).or_default().insert(location);
        }
    }

    /// Record a new last writer, returning the previous one
    pub fn set_writer(&mut self, location: StorageLocation, writer: Instance) -> Option<Instance> {
        self.track(location);
        self.last_writer.insert(location, writer)
    }

    pub fn writer(&self, location: &StorageLocation) -> Option<&Instance> {
        self.last_writer.get(location)
    }

    pub fn push_reader(&mut self, location: StorageLocation, reader: Instance) {
        self.track(location);
        self.last_readers.entry(location).or_default().push(reader);
    }

    /// Remove the readers of a location (in the order they were added)
    pub fn take_readers(&mut self, location: &StorageLocation) -> Vec<Instance> {
        self.last_readers.remove(location).unwrap_or_default()
    }

    fn evict(&mut self, locations: BTreeSet<StorageLocation>) -> Evicted {
        let mut evicted = Evicted::default();
        for location in locations {
            if let Some(writer) = self.last_writer.remove(&location) {
                evicted.writers.push((location, writer));
            }
            if let Some(readers) = self.last_readers.remove(&location) {
                evicted.readers.push((location, readers));
            }
        }
        evicted
    }

    /// Remove every location of an object
    pub fn evict_object(&mut self, object: ObjectId) -> Evicted {
        let locations = self.by_object.remove(&object).unwrap_or_default();
        self.evict(locations)
    }

    /// Remove every location scoped to a frame
    pub fn evict_frame(&mut self, frame: FrameId) -> Evicted {
        let locations = self.by_frame.remove(&frame).unwrap_or_default();
        self.evict(locations)
    }

    /// Remove everything
    pub fn evict_all(&mut self) -> Evicted {
        let mut locations: BTreeSet<StorageLocation> = self.last_writer.keys().copied().collect();
        locations.extend(self.last_readers.keys().copied());
        self.by_object.clear();
        self.by_frame.clear();
        self.evict(locations)
    }
}
