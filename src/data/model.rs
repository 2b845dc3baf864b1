use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Spot – one detection (one CSV row)
// ---------------------------------------------------------------------------

/// A single detected object at one time frame and one position.
#[derive(Debug, Clone, PartialEq)]
pub struct Spot {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    /// 0.0 when the source has no z column.
    pub z: f64,
    pub frame: u32,
    pub radius: f64,
    pub quality: Option<f64>,
    pub name: String,
    /// `None` means the spot belongs to no track.
    pub track_index: Option<i64>,
    /// Extra named scalar attributes, keyed by feature name.
    pub features: BTreeMap<String, f64>,
}

impl Spot {
    /// Squared euclidean distance between two spot centres.
    pub fn square_distance_to(&self, other: &Spot) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Spot attribute keys with a dedicated meaning. Feature names never use
/// them.
pub const CORE_SPOT_KEYS: &[&str] = &[
    "ID",
    "name",
    "VISIBILITY",
    "POSITION_X",
    "POSITION_Y",
    "POSITION_Z",
    "POSITION_T",
    "FRAME",
    "RADIUS",
    "QUALITY",
    "TRACK_ID",
];

/// Label given to spots whose source has no name.
pub fn default_name(id: u64) -> String {
    format!("ID{id}")
}

/// Position of a spot inside [`EntityGraph::spots`].
pub type SpotIndex = usize;

// ---------------------------------------------------------------------------
// Frame / Track – groupings referencing spots by index
// ---------------------------------------------------------------------------

/// All spots detected at one time index, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame: u32,
    pub spots: Vec<SpotIndex>,
}

/// Spots sharing one track index, ordered by strictly increasing frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub index: i64,
    pub spots: Vec<SpotIndex>,
}

impl Track {
    /// Consecutive `(source, target)` pairs along the trajectory.
    pub fn links(&self) -> impl Iterator<Item = (SpotIndex, SpotIndex)> + '_ {
        self.spots.windows(2).map(|w| (w[0], w[1]))
    }
}

// ---------------------------------------------------------------------------
// EntityGraph – the grouped result of one conversion
// ---------------------------------------------------------------------------

/// Owns every spot of a conversion; frames and tracks refer to them by index,
/// so each spot exists exactly once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityGraph {
    pub(crate) spots: Vec<Spot>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) tracks: BTreeMap<i64, Track>,
    pub(crate) ungrouped: Vec<SpotIndex>,
}

impl EntityGraph {
    /// All spots in input order.
    pub fn spots(&self) -> &[Spot] {
        &self.spots
    }

    pub fn spot(&self, index: SpotIndex) -> &Spot {
        &self.spots[index]
    }

    /// Frames in ascending frame order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Tracks keyed by track index (ascending).
    pub fn tracks(&self) -> &BTreeMap<i64, Track> {
        &self.tracks
    }

    /// Spots that belong to no track, in input order.
    pub fn ungrouped(&self) -> &[SpotIndex] {
        &self.ungrouped
    }

    /// Resolve a list of indices to spots.
    pub fn resolve<'a>(&'a self, indices: &'a [SpotIndex]) -> impl Iterator<Item = &'a Spot> + 'a {
        indices.iter().map(move |&i| &self.spots[i])
    }

    /// Highest frame number, if any spot exists.
    pub fn last_frame(&self) -> Option<u32> {
        self.frames.last().map(|f| f.frame)
    }

    /// Number of spots.
    pub fn len(&self) -> usize {
        self.spots.len()
    }

    /// Whether the graph holds no spots.
    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }
}
