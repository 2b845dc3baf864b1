use anyhow::{Context, Result};

const N_FRAMES: u32 = 50;
const N_TRACKS: i64 = 8;
const N_UNTRACKED: usize = 40;
const FIELD: f64 = 512.0;

/// One detection: a CSV row.
struct Detection {
    x: f64,
    y: f64,
    frame: u32,
    quality: f64,
    track: Option<i64>,
    area: f64,
}

/// Brownian walk with a small drift, starting somewhere in the field.
fn random_walk(track: i64, rng: &mut SimpleRng) -> Vec<Detection> {
    let start = (rng.next_f64() * (N_FRAMES / 2) as f64) as u32;
    let length = 10 + (rng.next_f64() * (N_FRAMES - start - 10) as f64) as u32;
    let (drift_x, drift_y) = (rng.gauss(0.0, 0.5), rng.gauss(0.0, 0.5));
    let mut x = 50.0 + rng.next_f64() * (FIELD - 100.0);
    let mut y = 50.0 + rng.next_f64() * (FIELD - 100.0);

    (start..start + length)
        .map(|frame| {
            x = (x + drift_x + rng.gauss(0.0, 1.5)).clamp(0.0, FIELD);
            y = (y + drift_y + rng.gauss(0.0, 1.5)).clamp(0.0, FIELD);
            Detection {
                x,
                y,
                frame,
                quality: 50.0 + rng.gauss(0.0, 10.0).abs(),
                track: Some(track),
                area: 30.0 + rng.gauss(0.0, 3.0),
            }
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);

    let mut detections: Vec<Detection> = (0..N_TRACKS)
        .flat_map(|track| random_walk(track, &mut rng))
        .collect();

    // Spurious detections that belong to no track
    for _ in 0..N_UNTRACKED {
        detections.push(Detection {
            x: rng.next_f64() * FIELD,
            y: rng.next_f64() * FIELD,
            frame: (rng.next_f64() * N_FRAMES as f64) as u32,
            quality: rng.next_f64() * 20.0,
            track: None,
            area: 10.0 + rng.gauss(0.0, 5.0).abs(),
        });
    }

    detections.sort_by_key(|d| d.frame);

    let output_path = "sample_tracks.csv";
    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {output_path}"))?;
    writer.write_record(["id", "x", "y", "frame", "quality", "track", "area"])?;
    for (id, d) in detections.iter().enumerate() {
        writer.write_record([
            id.to_string(),
            format!("{:.3}", d.x),
            format!("{:.3}", d.y),
            d.frame.to_string(),
            format!("{:.2}", d.quality),
            d.track.map(|t| t.to_string()).unwrap_or_default(),
            format!("{:.2}", d.area),
        ])?;
    }
    writer.flush()?;

    println!(
        "Wrote {} detections ({N_TRACKS} tracks over {N_FRAMES} frames) to {output_path}",
        detections.len()
    );
    println!(
        "Try: trackcsv export --csv {output_path} --image <image> --target sample.xml \
         --id-col 0 --x-col 1 --y-col 2 --frame-col 3 --quality-col 4 --track-col 5 --radius 3"
    );
    Ok(())
}
