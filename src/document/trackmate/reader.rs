use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::xml_error;
use crate::data::model::{default_name, Spot, CORE_SPOT_KEYS};
use crate::document::features::{Dimension, FeatureDeclaration};
use crate::document::{DocumentError, DocumentParts, DocumentReader};

type AttrMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy)]
enum FeatureGroup {
    Spot,
    Edge,
    Track,
}

/// Reads spots, track membership, feature declarations and calibration
/// from a TrackMate XML document.
pub struct TmXmlReader<R: BufRead> {
    xml: Reader<R>,
}

impl TmXmlReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, DocumentError> {
        let file = File::open(path)
            .map_err(|e| DocumentError::new(format!("File not found:\n{e}")))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<'a> TmXmlReader<&'a [u8]> {
    pub fn from_text(text: &'a str) -> Self {
        Self::new(text.as_bytes())
    }
}

impl<R: BufRead> TmXmlReader<R> {
    pub fn new(source: R) -> Self {
        TmXmlReader {
            xml: Reader::from_reader(source),
        }
    }

    fn read_document(&mut self) -> Result<DocumentParts, DocumentError> {
        let mut parts = DocumentParts::default();
        let mut group: Option<FeatureGroup> = None;
        let mut in_log = false;
        // (track id, edges) of the `Track` element being read.
        let mut open_track: Option<(i64, Vec<(u64, u64)>)> = None;
        let mut tracks: Vec<(i64, Vec<(u64, u64)>)> = Vec::new();

        let mut buf = Vec::new();
        loop {
            let event = self.xml.read_event_into(&mut buf).map_err(xml_error)?;
            match &event {
                Event::Start(e) | Event::Empty(e) => {
                    let self_closing = matches!(event, Event::Empty(_));
                    let attrs = attributes(e)?;
                    match e.name().as_ref() {
                        b"Log" => in_log = !self_closing,
                        b"Model" => {
                            if let Some(units) = attrs.get("spatialunits") {
                                parts.calibration.space_units = units.clone();
                            }
                            if let Some(units) = attrs.get("timeunits") {
                                parts.calibration.time_units = units.clone();
                            }
                        }
                        b"SpotFeatures" => group = Some(FeatureGroup::Spot),
                        b"EdgeFeatures" => group = Some(FeatureGroup::Edge),
                        b"TrackFeatures" => group = Some(FeatureGroup::Track),
                        b"Feature" => {
                            if let Some(g) = group {
                                let decl = declaration(&attrs)?;
                                match g {
                                    FeatureGroup::Spot => parts.features.spot.push(decl),
                                    FeatureGroup::Edge => parts.features.edge.push(decl),
                                    FeatureGroup::Track => parts.features.track.push(decl),
                                }
                            }
                        }
                        b"Spot" => parts.spots.push(spot(&attrs)?),
                        b"Track" => {
                            let id = required(&attrs, "TRACK_ID", "Track")?;
                            if self_closing {
                                tracks.push((id, Vec::new()));
                            } else {
                                open_track = Some((id, Vec::new()));
                            }
                        }
                        b"Edge" => {
                            let source = required(&attrs, "SPOT_SOURCE_ID", "Edge")?;
                            let target = required(&attrs, "SPOT_TARGET_ID", "Edge")?;
                            match open_track.as_mut() {
                                Some((_, edges)) => edges.push((source, target)),
                                None => warn!("Edge {source} -> {target} outside of a track, ignored"),
                            }
                        }
                        b"ImageData" => read_image_data(&attrs, &mut parts),
                        _ => {}
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"Log" => in_log = false,
                    b"Track" => tracks.extend(open_track.take()),
                    b"SpotFeatures" | b"EdgeFeatures" | b"TrackFeatures" => group = None,
                    _ => {}
                },
                Event::Text(t) if in_log => {
                    parts.log.push_str(&t.unescape().map_err(xml_error)?);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        assign_tracks_from_edges(&mut parts.spots, &tracks);
        debug!(
            "Read {} spots and {} tracks from document",
            parts.spots.len(),
            tracks.len()
        );
        Ok(parts)
    }
}

impl<R: BufRead> DocumentReader for TmXmlReader<R> {
    fn read(&mut self) -> Result<DocumentParts, DocumentError> {
        self.read_document()
    }
}

// ---------------------------------------------------------------------------
// Element decoding
// ---------------------------------------------------------------------------

fn attributes(e: &BytesStart<'_>) -> Result<AttrMap, DocumentError> {
    e.attributes()
        .map(|attr| {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            Ok((key, value))
        })
        .collect()
}

fn required<T: FromStr>(attrs: &AttrMap, key: &str, element: &str) -> Result<T, DocumentError> {
    let raw = attrs
        .get(key)
        .ok_or_else(|| DocumentError::new(format!("{element} element without {key} attribute")))?;
    parse_number(raw).ok_or_else(|| {
        DocumentError::new(format!("{element} element has malformed {key}: '{raw}'"))
    })
}

fn optional<T: FromStr>(attrs: &AttrMap, key: &str) -> Option<T> {
    attrs.get(key).and_then(|raw| parse_number(raw))
}

/// Integers may be stored as `3` or `3.0`; accept both.
fn parse_number<T: FromStr>(raw: &str) -> Option<T> {
    let raw = raw.trim();
    raw.parse::<T>().ok().or_else(|| {
        let v: f64 = raw.parse().ok()?;
        if v.fract() == 0.0 {
            format!("{}", v as i64).parse::<T>().ok()
        } else {
            None
        }
    })
}

fn spot(attrs: &AttrMap) -> Result<Spot, DocumentError> {
    let id = required(attrs, "ID", "Spot")?;
    let features = attrs
        .iter()
        .filter(|(key, _)| !CORE_SPOT_KEYS.contains(&key.as_str()))
        .filter_map(|(key, raw)| raw.trim().parse::<f64>().ok().map(|v| (key.clone(), v)))
        .collect();

    Ok(Spot {
        id,
        x: required(attrs, "POSITION_X", "Spot")?,
        y: required(attrs, "POSITION_Y", "Spot")?,
        z: optional(attrs, "POSITION_Z").unwrap_or(0.0),
        frame: required(attrs, "FRAME", "Spot")?,
        radius: required(attrs, "RADIUS", "Spot")?,
        quality: optional(attrs, "QUALITY"),
        name: attrs
            .get("name")
            .filter(|n| !n.is_empty())
            .cloned()
            .unwrap_or_else(|| default_name(id)),
        track_index: optional(attrs, "TRACK_ID"),
        features,
    })
}

fn declaration(attrs: &AttrMap) -> Result<FeatureDeclaration, DocumentError> {
    let key = attrs
        .get("feature")
        .ok_or_else(|| DocumentError::new("Feature element without feature attribute"))?;
    let text = |k: &str| attrs.get(k).cloned().unwrap_or_else(|| key.clone());
    Ok(FeatureDeclaration {
        key: key.clone(),
        name: text("name"),
        short_name: text("shortname"),
        dimension: attrs
            .get("dimension")
            .map_or(Dimension::None, |d| d.parse().unwrap_or(Dimension::None)),
        is_int: attrs.get("isint").is_some_and(|v| v == "true"),
    })
}

fn read_image_data(attrs: &AttrMap, parts: &mut DocumentParts) {
    let cal = &mut parts.calibration;
    if let Some(name) = attrs.get("filename") {
        cal.image_file_name = name.clone();
    }
    if let Some(folder) = attrs.get("folder") {
        cal.image_folder = folder.clone();
    }
    cal.width = optional(attrs, "width").unwrap_or(cal.width);
    cal.height = optional(attrs, "height").unwrap_or(cal.height);
    cal.n_slices = optional(attrs, "nslices").unwrap_or(cal.n_slices);
    cal.n_frames = optional(attrs, "nframes").unwrap_or(cal.n_frames);
    cal.pixel_width = optional(attrs, "pixelwidth").unwrap_or(cal.pixel_width);
    cal.pixel_height = optional(attrs, "pixelheight").unwrap_or(cal.pixel_height);
    cal.voxel_depth = optional(attrs, "voxeldepth").unwrap_or(cal.voxel_depth);
    cal.frame_interval = optional(attrs, "timeinterval").unwrap_or(cal.frame_interval);
}

/// Spots without a `TRACK_ID` attribute take the id of the track whose
/// edges reference them.
fn assign_tracks_from_edges(spots: &mut [Spot], tracks: &[(i64, Vec<(u64, u64)>)]) {
    let membership: HashMap<u64, i64> = tracks
        .iter()
        .flat_map(|(track, edges)| {
            edges
                .iter()
                .flat_map(move |&(s, t)| [(s, *track), (t, *track)])
        })
        .collect();
    for spot in spots.iter_mut().filter(|s| s.track_index.is_none()) {
        spot.track_index = membership.get(&spot.id).copied();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TrackMate version="7.0.0">
  <Log>made by hand</Log>
  <Model spatialunits="um" timeunits="s">
    <FeatureDeclarations>
      <SpotFeatures>
        <Feature feature="AREA" name="Area" shortname="A" dimension="LENGTH" isint="false"/>
      </SpotFeatures>
    </FeatureDeclarations>
    <AllSpots nspots="3">
      <SpotsInFrame frame="0">
        <Spot ID="10" name="first" POSITION_X="1.5" POSITION_Y="2" FRAME="0" RADIUS="3" QUALITY="0.5" AREA="12.25"/>
      </SpotsInFrame>
      <SpotsInFrame frame="1">
        <Spot ID="11" POSITION_X="2.5" POSITION_Y="2" POSITION_Z="1" FRAME="1.0" RADIUS="3"/>
        <Spot ID="12" POSITION_X="9" POSITION_Y="9" FRAME="1" RADIUS="3"/>
      </SpotsInFrame>
    </AllSpots>
    <AllTracks>
      <Track name="Track_4" TRACK_ID="4">
        <Edge SPOT_SOURCE_ID="10" SPOT_TARGET_ID="11" LINK_COST="1"/>
      </Track>
    </AllTracks>
  </Model>
  <Settings>
    <ImageData filename="cells.tif" folder="/data" width="128" height="64" nslices="1" nframes="2" pixelwidth="0.2" pixelheight="0.2" voxeldepth="1" timeinterval="30"/>
  </Settings>
</TrackMate>
"#;

    #[test]
    fn spots_and_calibration_are_read() {
        let parts = TmXmlReader::from_text(MINIMAL).read().unwrap();
        assert_eq!(parts.spots.len(), 3);
        assert_eq!(parts.log, "made by hand");

        let first = &parts.spots[0];
        assert_eq!(first.id, 10);
        assert_eq!(first.name, "first");
        assert_eq!((first.x, first.y, first.z), (1.5, 2.0, 0.0));
        assert_eq!(first.quality, Some(0.5));
        assert_eq!(first.features["AREA"], 12.25);

        let second = &parts.spots[1];
        assert_eq!(second.frame, 1);
        assert_eq!(second.name, "ID11");

        let cal = &parts.calibration;
        assert_eq!(cal.space_units, "um");
        assert_eq!(cal.time_units, "s");
        assert_eq!((cal.width, cal.height, cal.n_frames), (128, 64, 2));
        assert_eq!(cal.frame_interval, 30.0);

        assert_eq!(parts.features.spot.len(), 1);
        assert_eq!(parts.features.spot[0].dimension, Dimension::Length);
    }

    #[test]
    fn track_membership_comes_from_edges() {
        let parts = TmXmlReader::from_text(MINIMAL).read().unwrap();
        let tracks: Vec<Option<i64>> = parts.spots.iter().map(|s| s.track_index).collect();
        assert_eq!(tracks, vec![Some(4), Some(4), None]);
    }

    #[test]
    fn spot_without_position_is_an_error() {
        let xml = r#"<TrackMate><Model><AllSpots><SpotsInFrame frame="0">
            <Spot ID="1" POSITION_Y="2" FRAME="0" RADIUS="1"/>
            </SpotsInFrame></AllSpots></Model></TrackMate>"#;
        let err = TmXmlReader::from_text(xml).read().unwrap_err();
        assert!(err.0.contains("POSITION_X"), "{err}");
    }

    #[test]
    fn malformed_xml_is_reported() {
        let err = TmXmlReader::from_text("<TrackMate><Model></TrackMate>")
            .read()
            .unwrap_err();
        assert!(!err.0.is_empty());
    }

    #[test]
    fn integer_attributes_accept_float_spelling() {
        assert_eq!(parse_number::<u32>("4.0"), Some(4));
        assert_eq!(parse_number::<u32>("4.5"), None);
        assert_eq!(parse_number::<f64>("4.5"), Some(4.5));
    }
}
