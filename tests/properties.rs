use std::collections::{HashMap, HashSet};

use liiklus::association::associate;
use liiklus::config::LineConfig;
use liiklus::{BBox, Config, CountingEngine, Detection, TrackId, TrackRegistry, TrackStatus};
use quickcheck::{quickcheck, TestResult};

/// Raw generated box: x, y, width, height seeds.
type RawBox = (u16, u16, u8, u8);

fn to_bbox(&(x, y, w, h): &RawBox) -> BBox {
    let x1 = (x % 1200) as f32;
    let y1 = (y % 680) as f32;
    BBox::new(x1, y1, x1 + 10.0 + (w % 120) as f32, y1 + 10.0 + (h % 120) as f32)
}

fn to_detections(frame: &[RawBox]) -> Vec<Detection> {
    frame
        .iter()
        .map(|b| Detection::new(to_bbox(b), 0.8, "car"))
        .collect()
}

fn small_config() -> Config {
    Config {
        max_age: 3,
        min_hits: 2,
        ..Default::default()
    }
}

#[test]
fn matching_is_a_bijection() {
    fn prop(tracks: Vec<RawBox>, dets: Vec<RawBox>) -> bool {
        let tracks: Vec<BBox> = tracks.iter().map(to_bbox).collect();
        let dets: Vec<BBox> = dets.iter().map(to_bbox).collect();
        let a = associate(&tracks, &dets, 0.3);

        let track_side: HashSet<usize> = a.matches.iter().map(|m| m.0).collect();
        let det_side: HashSet<usize> = a.matches.iter().map(|m| m.1).collect();
        let bijective = track_side.len() == a.matches.len() && det_side.len() == a.matches.len();

        let gated = a.matches.iter().all(|&(t, d)| tracks[t].iou(&dets[d]) >= 0.3);

        // every index is accounted for exactly once
        let partitioned = track_side.len() + a.unmatched_tracks.len() == tracks.len()
            && det_side.len() + a.unmatched_detections.len() == dets.len()
            && a.unmatched_tracks.iter().all(|t| !track_side.contains(t))
            && a.unmatched_detections.iter().all(|d| !det_side.contains(d));

        bijective && gated && partitioned
    }
    quickcheck(prop as fn(Vec<RawBox>, Vec<RawBox>) -> bool);
}

#[test]
fn identities_are_unique_and_never_reused() {
    fn prop(frames: Vec<Vec<RawBox>>) -> bool {
        let mut registry: TrackRegistry = TrackRegistry::new(&small_config()).unwrap();
        let mut ever_created: HashSet<TrackId> = HashSet::new();
        let mut evicted: HashSet<TrackId> = HashSet::new();
        let mut last: Option<TrackId> = None;

        for frame in &frames {
            let out = registry.update(&to_detections(frame));
            for id in &out.created {
                // fresh identities are strictly increasing
                if last.map_or(false, |l| *id <= l) || !ever_created.insert(*id) {
                    return false;
                }
                last = Some(*id);
            }
            evicted.extend(out.evicted.iter().copied());
            if registry.tracks().any(|t| evicted.contains(&t.id())) {
                return false;
            }
            let live: HashSet<TrackId> = registry.tracks().map(|t| t.id()).collect();
            if live.len() != registry.len() {
                return false;
            }
        }
        true
    }
    quickcheck(prop as fn(Vec<Vec<RawBox>>) -> bool);
}

#[test]
fn status_only_moves_forward_and_stale_tracks_are_gone() {
    fn prop(frames: Vec<Vec<RawBox>>) -> bool {
        let config = small_config();
        let mut registry: TrackRegistry = TrackRegistry::new(&config).unwrap();
        let mut seen: HashMap<TrackId, TrackStatus> = HashMap::new();

        for frame in &frames {
            registry.update(&to_detections(frame));
            for track in registry.tracks() {
                if track.time_since_update() > config.max_age || track.is_dead() {
                    return false;
                }
                let status = track.status();
                if let Some(prev) = seen.insert(track.id(), status) {
                    if status < prev {
                        return false;
                    }
                }
            }
            // confirmed view never exposes a tentative track
            for snap in registry.confirmed() {
                match registry.get(snap.id) {
                    Some(t) if t.is_confirmed() => {}
                    _ => return false,
                }
            }
        }
        true
    }
    quickcheck(prop as fn(Vec<Vec<RawBox>>) -> bool);
}

#[test]
fn each_track_counts_at_most_once_per_line() {
    /// Objects moving horizontally through the gate with occasional dropouts.
    fn prop(objects: Vec<(u8, u8, u16)>, dropouts: Vec<u8>) -> TestResult {
        if objects.is_empty() || objects.len() > 8 {
            return TestResult::discard();
        }
        let config = Config {
            lines: vec![LineConfig {
                name: "gate".into(),
                start: [640.0, 0.0],
                end: [640.0, 720.0],
                margin: None,
            }],
            ..Default::default()
        };
        let mut engine: CountingEngine = CountingEngine::new(&config).unwrap();
        let mut counted: HashSet<TrackId> = HashSet::new();

        for frame in 0..120u32 {
            let dets: Vec<Detection> = objects
                .iter()
                .enumerate()
                .filter(|(i, _)| !dropouts.iter().any(|d| *d as u32 == frame + *i as u32))
                .map(|(i, &(start, speed, lane))| {
                    let cx = 400.0 + start as f32 + (1 + speed % 8) as f32 * frame as f32;
                    let cy = 40.0 + (lane % 8) as f32 * 80.0 + i as f32;
                    Detection::new(BBox::from_center(cx, cy, 50.0, 50.0), 0.9, "car")
                })
                .collect();
            let report = engine.process_frame(&dets);
            for event in &report.events {
                if !counted.insert(event.track_id) {
                    return TestResult::failed();
                }
            }
            let total = report.lines[0].total as usize;
            if total != counted.len() || report.distinct_total != counted.len() {
                return TestResult::failed();
            }
        }
        TestResult::passed()
    }
    quickcheck(prop as fn(Vec<(u8, u8, u16)>, Vec<u8>) -> TestResult);
}

#[test]
fn malformed_input_never_reaches_the_tracker() {
    fn prop(frames: Vec<Vec<(i16, i16, i16, i16, u8)>>) -> bool {
        let mut registry: TrackRegistry = TrackRegistry::new(&small_config()).unwrap();
        for frame in &frames {
            let dets: Vec<Detection> = frame
                .iter()
                .map(|&(x1, y1, x2, y2, c)| {
                    Detection::new(
                        BBox::new(x1 as f32, y1 as f32, x2 as f32, y2 as f32),
                        c as f32 / 200.0,
                        "car",
                    )
                })
                .collect();
            let valid = dets.iter().filter(|d| d.validate().is_ok()).count();
            let out = registry.update(&dets);
            if out.rejected + valid != dets.len() {
                return false;
            }
            if out.created.len() + out.matched > valid {
                return false;
            }
            for track in registry.tracks() {
                let b = track.bbox();
                if !(b.x1 < b.x2 && b.y1 < b.y2) {
                    return false;
                }
            }
        }
        true
    }
    quickcheck(prop as fn(Vec<Vec<(i16, i16, i16, i16, u8)>>) -> bool);
}
