use std::collections::{BTreeMap, BTreeSet};

use super::model::{EntityGraph, Frame, Spot, SpotIndex, Track};
use crate::error::{ConvertError, Result};

/// Group assembled spots into frames and tracks.
///
/// Frames come out in ascending frame order with spots in input order.
/// Each track is stably sorted by frame; two members sharing a frame is an
/// error, as are two spots sharing an id. Output depends only on the input
/// order, never on hashing.
pub fn group(spots: Vec<Spot>) -> Result<EntityGraph> {
    let mut ids = BTreeSet::new();
    for spot in &spots {
        if !ids.insert(spot.id) {
            return Err(ConvertError::DuplicateSpotId(spot.id));
        }
    }

    let mut by_frame: BTreeMap<u32, Vec<SpotIndex>> = BTreeMap::new();
    for (i, spot) in spots.iter().enumerate() {
        by_frame.entry(spot.frame).or_default().push(i);
    }
    let frames = by_frame
        .into_iter()
        .map(|(frame, spots)| Frame { frame, spots })
        .collect();

    let mut by_track: BTreeMap<i64, Vec<SpotIndex>> = BTreeMap::new();
    let mut ungrouped = Vec::new();
    for (i, spot) in spots.iter().enumerate() {
        match spot.track_index {
            Some(track) => by_track.entry(track).or_default().push(i),
            None => ungrouped.push(i),
        }
    }

    let mut tracks = BTreeMap::new();
    for (index, mut members) in by_track {
        members.sort_by_key(|&i| spots[i].frame);
        if let Some(w) = members
            .windows(2)
            .find(|w| spots[w[0]].frame == spots[w[1]].frame)
        {
            return Err(ConvertError::DuplicateFrameInTrack {
                track: index,
                frame: spots[w[0]].frame,
            });
        }
        tracks.insert(
            index,
            Track {
                index,
                spots: members,
            },
        );
    }

    Ok(EntityGraph {
        spots,
        frames,
        tracks,
        ungrouped,
    })
}
