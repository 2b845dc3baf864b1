use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::{xml_error, FORMAT_VERSION, GUI_STATE_SPOTS, GUI_STATE_TRACKS};
use crate::data::model::{Spot, CORE_SPOT_KEYS};
use crate::document::features::{edge_feature, track_feature};
use crate::document::{Calibration, Document, DocumentError, DocumentWriter};

type Attrs<'a> = Vec<(&'a str, String)>;

/// Writes a [`Document`] as TrackMate XML.
pub struct TmXmlWriter<W: Write> {
    xml: Writer<W>,
}

impl<W: Write> TmXmlWriter<W> {
    pub fn new(sink: W) -> Self {
        TmXmlWriter {
            xml: Writer::new_with_indent(sink, b' ', 2),
        }
    }

    pub fn into_inner(self) -> W {
        self.xml.into_inner()
    }

    fn write_document(&mut self, doc: &Document) -> Result<(), DocumentError> {
        self.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.open("TrackMate", &[("version", FORMAT_VERSION.to_string())])?;

        self.open("Log", &[])?;
        self.emit(Event::Text(BytesText::new(&doc.log)))?;
        self.close("Log")?;

        self.write_model(doc)?;
        self.write_settings(&doc.calibration)?;

        let state = if doc.graph.tracks().is_empty() {
            GUI_STATE_SPOTS
        } else {
            GUI_STATE_TRACKS
        };
        self.empty("GUIState", &[("state", state.to_string())])?;
        self.close("TrackMate")?;

        self.xml.get_mut().flush().map_err(xml_error)
    }

    fn write_model(&mut self, doc: &Document) -> Result<(), DocumentError> {
        let graph = &doc.graph;
        let cal = &doc.calibration;

        self.open(
            "Model",
            &[
                ("spatialunits", cal.space_units.clone()),
                ("timeunits", cal.time_units.clone()),
            ],
        )?;

        // -- feature declarations --
        self.open("FeatureDeclarations", &[])?;
        for (group, decls) in [
            ("SpotFeatures", &doc.features.spot),
            ("EdgeFeatures", &doc.features.edge),
            ("TrackFeatures", &doc.features.track),
        ] {
            self.open(group, &[])?;
            for f in decls {
                self.empty(
                    "Feature",
                    &[
                        ("feature", f.key.clone()),
                        ("name", f.name.clone()),
                        ("shortname", f.short_name.clone()),
                        ("dimension", f.dimension.to_string()),
                        ("isint", f.is_int.to_string()),
                    ],
                )?;
            }
            self.close(group)?;
        }
        self.close("FeatureDeclarations")?;

        // -- spots, frame by frame --
        self.open("AllSpots", &[("nspots", graph.len().to_string())])?;
        for frame in graph.frames() {
            self.open("SpotsInFrame", &[("frame", frame.frame.to_string())])?;
            for spot in graph.resolve(&frame.spots) {
                self.empty("Spot", &spot_attributes(spot, cal))?;
            }
            self.close("SpotsInFrame")?;
        }
        self.close("AllSpots")?;

        // -- tracks as chains of edges --
        self.open("AllTracks", &[])?;
        for (position, track) in graph.tracks().values().enumerate() {
            let mut attrs: Attrs = vec![("name", format!("Track_{}", track.index))];
            for f in &doc.features.track {
                let value = match f.key.as_str() {
                    "TRACK_ID" => Some(track.index.to_string()),
                    key => track_feature(key, graph, track, position, cal)
                        .map(|v| format_value(v, f.is_int)),
                };
                if let Some(value) = value {
                    attrs.push((f.key.as_str(), value));
                }
            }
            self.open("Track", &attrs)?;
            for (s, t) in track.links() {
                let (source, target) = (graph.spot(s), graph.spot(t));
                let attrs: Attrs = doc
                    .features
                    .edge
                    .iter()
                    .filter_map(|f| {
                        // Ids are written as integers, never through f64.
                        let value = match f.key.as_str() {
                            "SPOT_SOURCE_ID" => Some(source.id.to_string()),
                            "SPOT_TARGET_ID" => Some(target.id.to_string()),
                            key => edge_feature(key, source, target, cal)
                                .map(|v| format_value(v, f.is_int)),
                        };
                        value.map(|v| (f.key.as_str(), v))
                    })
                    .collect();
                self.empty("Edge", &attrs)?;
            }
            self.close("Track")?;
        }
        self.close("AllTracks")?;

        self.open("FilteredTracks", &[])?;
        for track in graph.tracks().values() {
            self.empty("TrackID", &[("TRACK_ID", track.index.to_string())])?;
        }
        self.close("FilteredTracks")?;

        self.close("Model")
    }

    fn write_settings(&mut self, cal: &Calibration) -> Result<(), DocumentError> {
        self.open("Settings", &[])?;
        self.empty(
            "ImageData",
            &[
                ("filename", cal.image_file_name.clone()),
                ("folder", cal.image_folder.clone()),
                ("width", cal.width.to_string()),
                ("height", cal.height.to_string()),
                ("nslices", cal.n_slices.to_string()),
                ("nframes", cal.n_frames.to_string()),
                ("pixelwidth", cal.pixel_width.to_string()),
                ("pixelheight", cal.pixel_height.to_string()),
                ("voxeldepth", cal.voxel_depth.to_string()),
                ("timeinterval", cal.frame_interval.to_string()),
            ],
        )?;
        self.empty(
            "BasicSettings",
            &[
                ("xstart", "0".to_string()),
                ("xend", cal.width.saturating_sub(1).to_string()),
                ("ystart", "0".to_string()),
                ("yend", cal.height.saturating_sub(1).to_string()),
                ("zstart", "0".to_string()),
                ("zend", cal.n_slices.saturating_sub(1).to_string()),
                ("tstart", "0".to_string()),
                ("tend", cal.n_frames.saturating_sub(1).to_string()),
            ],
        )?;
        self.close("Settings")
    }

    // -- event helpers --

    fn emit(&mut self, event: Event<'_>) -> Result<(), DocumentError> {
        self.xml.write_event(event).map_err(xml_error)
    }

    fn open(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<(), DocumentError> {
        self.emit(Event::Start(element(name, attrs)))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<(), DocumentError> {
        self.emit(Event::Empty(element(name, attrs)))
    }

    fn close(&mut self, name: &str) -> Result<(), DocumentError> {
        self.emit(Event::End(BytesEnd::new(name)))
    }
}

impl<W: Write> DocumentWriter for TmXmlWriter<W> {
    fn write(&mut self, document: &Document) -> Result<(), DocumentError> {
        self.write_document(document)
    }
}

fn element<'a>(name: &'a str, attrs: &[(&str, String)]) -> BytesStart<'a> {
    let mut elem = BytesStart::new(name);
    for (key, value) in attrs {
        elem.push_attribute((*key, value.as_str()));
    }
    elem
}

fn spot_attributes<'a>(spot: &'a Spot, cal: &Calibration) -> Attrs<'a> {
    let mut attrs: Attrs = vec![
        ("ID", spot.id.to_string()),
        ("name", spot.name.clone()),
        ("VISIBILITY", "1".to_string()),
        ("POSITION_X", spot.x.to_string()),
        ("POSITION_Y", spot.y.to_string()),
        ("POSITION_Z", spot.z.to_string()),
        ("POSITION_T", cal.time_of(spot.frame).to_string()),
        ("FRAME", spot.frame.to_string()),
        ("RADIUS", spot.radius.to_string()),
    ];
    if let Some(q) = spot.quality {
        attrs.push(("QUALITY", q.to_string()));
    }
    if let Some(track) = spot.track_index {
        attrs.push(("TRACK_ID", track.to_string()));
    }
    attrs.extend(
        spot.features
            .iter()
            .filter(|(key, _)| !CORE_SPOT_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value.to_string())),
    );
    attrs
}

fn format_value(value: f64, is_int: bool) -> String {
    if is_int && value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::grouper::group;
    use crate::data::model::default_name;
    use crate::document::trackmate::TmXmlReader;
    use crate::document::{DocumentReader, FeatureDeclarations};

    fn spot(id: u64, frame: u32, x: f64, y: f64, track: Option<i64>) -> Spot {
        Spot {
            id,
            x,
            y,
            z: 0.0,
            frame,
            radius: 1.5,
            quality: None,
            name: default_name(id),
            track_index: track,
            features: Default::default(),
        }
    }

    fn document(all: bool) -> Document {
        let mut lone = spot(5, 1, 9.0, 9.0, None);
        lone.quality = Some(0.75);
        lone.features.insert("AREA".to_string(), 12.5);
        let graph = group(vec![
            spot(1, 0, 0.0, 0.0, Some(3)),
            spot(2, 1, 3.0, 4.0, Some(3)),
            lone,
        ])
        .unwrap();
        Document {
            graph,
            calibration: Calibration {
                frame_interval: 2.0,
                n_frames: 2,
                ..Default::default()
            },
            features: FeatureDeclarations::for_export(all, ["AREA"]),
            log: "written by a test".to_string(),
        }
    }

    fn render(doc: &Document) -> String {
        let mut writer = TmXmlWriter::new(Vec::new());
        writer.write(doc).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn tracks_become_chains_of_edges() {
        let xml = render(&document(false));
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<TrackMate version="7.0.0">"#));
        assert!(xml.contains(r#"<AllSpots nspots="3">"#));
        assert!(xml.contains(r#"<Track name="Track_3" TRACK_INDEX="0" TRACK_ID="3">"#));
        assert!(xml.contains(r#"<Edge SPOT_SOURCE_ID="1" SPOT_TARGET_ID="2" LINK_COST="25"/>"#));
        assert!(xml.contains(r#"<TrackID TRACK_ID="3"/>"#));
        assert!(xml.contains(r#"<GUIState state="ConfigureViews"/>"#));
        // Minimal declarations leave out the derived statistics.
        assert!(!xml.contains("DISPLACEMENT"));
    }

    #[test]
    fn spot_time_follows_frame_interval() {
        let xml = render(&document(false));
        assert!(xml.contains(r#"POSITION_T="2" FRAME="1""#));
        assert!(xml.contains(r#"QUALITY="0.75""#));
        assert!(xml.contains(r#"AREA="12.5""#));
    }

    #[test]
    fn all_features_add_edge_and_track_statistics() {
        let xml = render(&document(true));
        assert!(xml.contains(r#"DISPLACEMENT="5""#));
        assert!(xml.contains(r#"SPEED="2.5""#));
        assert!(xml.contains(r#"NUMBER_SPOTS="2""#));
        assert!(xml.contains(r#"TRACK_DURATION="2""#));
        // No spot of the track has a quality.
        assert!(!xml.contains("TRACK_MEAN_QUALITY=\""));
    }

    #[test]
    fn without_tracks_the_gui_opens_on_spots() {
        let mut doc = document(false);
        doc.graph = group(vec![spot(1, 0, 0.0, 0.0, None)]).unwrap();
        let xml = render(&doc);
        assert!(xml.contains(r#"<GUIState state="SpotFilter"/>"#));
        assert!(xml.contains("<AllTracks"));
    }

    #[test]
    fn written_document_reads_back() {
        let doc = document(true);
        let xml = render(&doc);
        let parts = TmXmlReader::from_text(&xml).read().unwrap();

        let regrouped = group(parts.spots).unwrap();
        assert_eq!(regrouped, doc.graph);
        assert_eq!(parts.log, "written by a test");
        assert_eq!(parts.calibration.frame_interval, 2.0);
        assert_eq!(parts.calibration.n_frames, 2);
        assert_eq!(parts.features.spot.len(), doc.features.spot.len());
    }

    #[test]
    fn ids_beyond_f64_precision_are_written_exactly() {
        let big = (1u64 << 53) + 1;
        let mut doc = document(false);
        doc.graph = group(vec![
            spot(big, 0, 0.0, 0.0, Some(big as i64)),
            spot(big + 2, 1, 1.0, 0.0, Some(big as i64)),
        ])
        .unwrap();
        let xml = render(&doc);
        assert!(xml.contains(
            r#"<Edge SPOT_SOURCE_ID="9007199254740993" SPOT_TARGET_ID="9007199254740995""#
        ));
        assert!(xml.contains(r#"TRACK_INDEX="0" TRACK_ID="9007199254740993">"#));

        let parts = TmXmlReader::from_text(&xml).read().unwrap();
        assert_eq!(group(parts.spots).unwrap(), doc.graph);
    }
}
