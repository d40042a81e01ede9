use std::sync::Mutex;

use cgmath::{MetricSpace, Point2};
use png::HasParameters;
use rand::Rng;
use rocket::{
    http::{ContentType, Cookies},
    response::{
        Content,
        status::BadRequest,
        content::Json,
    },
};
use serde_json::{json, Value as JsonValue};

use crate::cache::TtlCache;
use crate::geo::Coordinates;
use crate::session_sys;
use crate::util;


lazy_static! {
    static ref HEATMAP_CACHE: Mutex<TtlCache<Vec<HeatPoint>>> = {
        Mutex::new(TtlCache::new())
    };
}

const RANDOM_POINT_COUNT: usize = 20;
const RANDOM_SPREAD: f64 = 0.02;
const GRID_STEP: f64 = 0.01;

/// Blur radius in pixels.
pub const RADIUS: f64 = 15.0;
pub const GRADIENT: [(f64, [u8; 3]); 3] = [
    (0.4, [0, 0, 255]),
    (0.65, [255, 255, 0]),
    (0.9, [255, 0, 0]),
];
const GRADIENT_NAMES: [&'static str; 3] = ["blue", "yellow", "red"];

const IMG_SIZE: usize = 256;
/// Degrees covered on each side of the centre of the image.
const IMG_SPAN: f64 = 0.03;
const MAX_ALPHA: f64 = 200.0;


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatPoint {
    pub lat: f64,
    pub lng: f64,
    pub intensity: f64,
}

impl HeatPoint {
    pub fn new(lat: f64, lng: f64, intensity: f64) -> Self {
        HeatPoint { lat, lng, intensity }
    }

    pub fn to_triple(&self) -> JsonValue {
        json!([self.lat, self.lng, self.intensity])
    }
}


/// Scattered risk samples around `center`.
pub fn risk_points<R: Rng + ?Sized>(center: Coordinates, rng: &mut R) -> Vec<HeatPoint> {
    (0..RANDOM_POINT_COUNT)
        .map(|_| {
            let lat = center.lat + rng.gen_range(-RANDOM_SPREAD..=RANDOM_SPREAD);
            let lng = center.lng + rng.gen_range(-RANDOM_SPREAD..=RANDOM_SPREAD);
            HeatPoint::new(lat, lng, rng.gen_range(0.0..=1.0))
        })
        .collect()
}

/// Passes `points` through, or lays a 3x3 grid around `center` when empty.
pub fn generate_heatmap_data(center: Coordinates, points: Vec<HeatPoint>) -> Vec<HeatPoint> {
    if !points.is_empty() {
        return points;
    }

    let mut grid = Vec::with_capacity(9);
    for &d_lat in &[0.0, GRID_STEP, -GRID_STEP] {
        for &d_lng in &[0.0, GRID_STEP, -GRID_STEP] {
            let intensity = match (d_lat == 0.0, d_lng == 0.0) {
                (true, true) => 1.0,
                (true, false) | (false, true) => 0.7,
                (false, false) => 0.4,
            };
            grid.push(HeatPoint::new(center.lat + d_lat, center.lng + d_lng, intensity));
        }
    }

    grid.sort_by(|a, b| b.intensity.partial_cmp(&a.intensity)
        .unwrap_or(std::cmp::Ordering::Equal));
    grid
}

/// Cached heatmap of the area around `center`.
pub fn heatmap_for(center: Coordinates) -> Vec<HeatPoint> {
    let key = util::location_key("heatmap", center);

    if let Some(points) = HEATMAP_CACHE.lock().ok().and_then(|c| c.get(&key)) {
        return points;
    }

    let points = generate_heatmap_data(center, risk_points(center, &mut rand::thread_rng()));
    if let Ok(mut cache) = HEATMAP_CACHE.lock() {
        cache.set(key, points.clone());
    }
    points
}

fn bounds(center: Coordinates) -> (Coordinates, Coordinates) {
    (center.offset(-IMG_SPAN, -IMG_SPAN), center.offset(IMG_SPAN, IMG_SPAN))
}

pub fn layer_json(center: Coordinates, points: &[HeatPoint]) -> JsonValue {
    let gradient = GRADIENT.iter()
        .zip(GRADIENT_NAMES.iter())
        .map(|(&(stop, _), &name)| (stop.to_string(), json!(name)))
        .collect::<serde_json::Map<_, _>>();
    let (south_west, north_east) = bounds(center);

    json!({
        "center": center.to_pair(),
        "points": points.iter().map(HeatPoint::to_triple).collect::<Vec<_>>(),
        "size": points.len(),
        "radius": RADIUS,
        "gradient": gradient,
        "image": {
            "url": "/heatmap-image",
            "bounds": [south_west.to_pair(), north_east.to_pair()],
            "width": IMG_SIZE,
            "height": IMG_SIZE,
        },
    })
}


/// Gradient colour for a heat value in [0, 1], transparent below the
/// first stop.
pub fn gradient_color(value: f64) -> [u8; 4] {
    let value = value.max(0.0).min(1.0);
    let (first_stop, first_rgb) = GRADIENT[0];

    if value <= 0.0 {
        return [0, 0, 0, 0];
    }

    let rgb = if value <= first_stop {
        first_rgb
    }
    else {
        let mut rgb = GRADIENT[GRADIENT.len() - 1].1;

        for pair in GRADIENT.windows(2) {
            let (lo, lo_rgb) = pair[0];
            let (hi, hi_rgb) = pair[1];

            if value <= hi {
                let t = (value - lo) / (hi - lo);
                for c in 0..3 {
                    rgb[c] = (lo_rgb[c] as f64 + (hi_rgb[c] as f64 - lo_rgb[c] as f64) * t).round() as u8;
                }
                break;
            }
        }

        rgb
    };

    let alpha = (MAX_ALPHA * (value / first_stop).min(1.0)).round() as u8;
    [rgb[0], rgb[1], rgb[2], alpha]
}

/// Rasterises `points` over the area around `center` into an RGBA PNG.
pub fn render_png(center: Coordinates, points: &[HeatPoint]) -> Result<Vec<u8>, String> {
    let (south_west, north_east) = bounds(center);
    let px_per_lng = IMG_SIZE as f64 / (north_east.lng - south_west.lng);
    let px_per_lat = IMG_SIZE as f64 / (north_east.lat - south_west.lat);

    let spots = points.iter()
        .map(|p| {
            let x = (p.lng - south_west.lng) * px_per_lng;
            let y = (north_east.lat - p.lat) * px_per_lat;
            (Point2::new(x, y), p.intensity)
        })
        .collect::<Vec<_>>();

    let mut pixels = vec![0u8; IMG_SIZE * IMG_SIZE * 4];

    for y in 0..IMG_SIZE {
        for x in 0..IMG_SIZE {
            let pixel = Point2::new(x as f64 + 0.5, y as f64 + 0.5);

            let heat: f64 = spots.iter()
                .map(|&(spot, weight)| {
                    let d = pixel.distance(spot);
                    if d < RADIUS {
                        weight * (1.0 - d / RADIUS).powi(2)
                    }
                    else {
                        0.0
                    }
                })
                .sum();

            let index = (y * IMG_SIZE + x) * 4;
            pixels[index..index + 4].copy_from_slice(&gradient_color(heat));
        }
    }

    let mut img_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut img_data, IMG_SIZE as u32, IMG_SIZE as u32);
        encoder.set(png::ColorType::RGBA).set(png::BitDepth::Eight);

        let mut writer = encoder.write_header()
            .map_err(|err| err.to_string())?;
        writer.write_image_data(&pixels)
            .map_err(|err| err.to_string())?;
    }

    Ok(img_data)
}


#[get("/heatmap")]
pub fn get_heatmap(mut cookies: Cookies) -> Json<String> {
    let center = session_sys::current_location(&mut cookies).coordinates();
    let points = heatmap_for(center);

    Json(layer_json(center, &points).to_string())
}

#[get("/heatmap-image")]
pub fn get_heatmap_image(mut cookies: Cookies) -> Result<Content<Vec<u8>>, BadRequest<String>> {
    let center = session_sys::current_location(&mut cookies).coordinates();
    let points = heatmap_for(center);

    render_png(center, &points)
        .map(|img| Content(ContentType::PNG, img))
        .map_err(|err| {
            warn!("Fail to render heatmap: {}", err);
            BadRequest(Some(err))
        })
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn random_points_stay_close() {
        let center = Coordinates::new(17.5, 78.3);
        let points = risk_points(center, &mut StdRng::seed_from_u64(3));

        assert_eq!(points.len(), RANDOM_POINT_COUNT);
        for p in &points {
            assert!((p.lat - center.lat).abs() <= RANDOM_SPREAD);
            assert!((p.lng - center.lng).abs() <= RANDOM_SPREAD);
            assert!(p.intensity >= 0.0 && p.intensity <= 1.0);
        }
    }

    #[test]
    fn points_pass_through() {
        let center = Coordinates::new(1.0, 1.0);
        let points = vec![HeatPoint::new(1.0, 1.0, 0.3)];
        assert_eq!(generate_heatmap_data(center, points.clone()), points);
    }

    #[test]
    fn fallback_grid() {
        let center = Coordinates::new(40.0, -74.0);
        let grid = generate_heatmap_data(center, Vec::new());

        assert_eq!(grid.len(), 9);
        assert_eq!(grid[0], HeatPoint::new(40.0, -74.0, 1.0));
        assert_eq!(grid.iter().filter(|p| p.intensity == 0.7).count(), 4);
        assert_eq!(grid.iter().filter(|p| p.intensity == 0.4).count(), 4);

        let corner = grid.iter().find(|p| p.intensity == 0.4).unwrap();
        assert!(((corner.lat - center.lat).abs() - GRID_STEP).abs() < 1e-9);
        assert!(((corner.lng - center.lng).abs() - GRID_STEP).abs() < 1e-9);
    }

    #[test]
    fn gradient_stops() {
        assert_eq!(gradient_color(0.0), [0, 0, 0, 0]);
        assert_eq!(gradient_color(0.2)[..3], [0, 0, 255]);
        assert_eq!(gradient_color(0.65), [255, 255, 0, 200]);
        assert_eq!(gradient_color(0.9)[..3], [255, 0, 0]);
        assert_eq!(gradient_color(3.0), [255, 0, 0, 200]);
        assert!(gradient_color(0.2)[3] < gradient_color(0.4)[3]);
    }

    #[test]
    fn layer_description() {
        let center = Coordinates::new(1.0, 2.0);
        let layer = layer_json(center, &[HeatPoint::new(1.0, 2.0, 0.5)]);

        assert_eq!(layer["radius"], 15.0);
        assert_eq!(layer["gradient"]["0.4"], "blue");
        assert_eq!(layer["gradient"]["0.65"], "yellow");
        assert_eq!(layer["points"][0][2], 0.5);
    }

    #[test]
    fn renders_png() {
        let center = Coordinates::new(17.5, 78.3);
        let points = generate_heatmap_data(center, Vec::new());

        let img = render_png(center, &points).unwrap();
        assert_eq!(&img[1..4], b"PNG");

        let decoder = png::Decoder::new(img.as_slice());
        let (info, _) = decoder.read_info().unwrap();
        assert_eq!(info.width, IMG_SIZE as u32);
        assert_eq!(info.height, IMG_SIZE as u32);
    }
}
