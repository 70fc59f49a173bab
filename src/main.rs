use eframe::egui;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use thiserror::Error;

// ── Data Model ──────────────────────────────────────────────────────────────

/// Which axis a numeric input edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// A point expressed as percentages of image width/height.
///
/// Invariant: both axes stay within [0, 100]; every mutation clamps.
#[derive(Clone, Copy, Debug, PartialEq)]
struct NormalizedPoint {
    x: f32,
    y: f32,
}

impl Default for NormalizedPoint {
    fn default() -> Self {
        Self { x: 50.0, y: 50.0 }
    }
}

impl NormalizedPoint {
    fn new(x: f32, y: f32) -> Self {
        Self {
            x: x.clamp(0.0, 100.0),
            y: y.clamp(0.0, 100.0),
        }
    }

    fn set_axis(&mut self, axis: Axis, value: f32) {
        let value = value.clamp(0.0, 100.0);
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
        }
    }

    /// Text form that `parse_coordinates` accepts and reproduces.
    fn canonical_text(&self) -> String {
        format!("{},{}", self.x, self.y)
    }

    /// Pixel position of this point on an image of the given natural size.
    fn to_pixel(&self, width: u32, height: u32) -> egui::Pos2 {
        egui::pos2(
            width as f32 * self.x / 100.0,
            height as f32 * self.y / 100.0,
        )
    }
}

#[derive(Debug)]
struct ImageAsset {
    rgba: image::RgbaImage,
}

impl ImageAsset {
    fn width(&self) -> u32 {
        self.rgba.width()
    }

    fn height(&self) -> u32 {
        self.rgba.height()
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
enum DecodeError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("expected coordinates like \"50,50\" or \"(12.5, 87)\"")]
struct ParseError;

// ── Coordinate Parsing ──────────────────────────────────────────────────────

// Optional parentheses around two non-negative decimal numbers separated by a
// comma. ASCII digits only: negative numbers and exponent notation must not
// match.
static COORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\(?([0-9]+(?:\.[0-9]+)?)\s*,\s*([0-9]+(?:\.[0-9]+)?)\)?\s*$")
        .expect("coordinate regex is valid")
});

fn parse_coordinates(text: &str) -> Result<NormalizedPoint, ParseError> {
    let caps = COORD_RE.captures(text).ok_or(ParseError)?;
    let x = caps[1].parse::<f32>().map_err(|_| ParseError)?;
    let y = caps[2].parse::<f32>().map_err(|_| ParseError)?;
    Ok(NormalizedPoint::new(x, y))
}

// ── Image Loading ───────────────────────────────────────────────────────────

fn decode_image(bytes: &[u8]) -> Result<ImageAsset, DecodeError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    Ok(ImageAsset { rgba })
}

fn load_image(path: &Path) -> Result<ImageAsset, DecodeError> {
    let bytes = std::fs::read(path).map_err(|source| DecodeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_image(&bytes)
}

/// Completion message from a background load, tagged with the generation of
/// the request that started it so stale completions can be dropped.
struct DecodeOutcome {
    generation: u64,
    result: Result<ImageAsset, DecodeError>,
}

// ── Marker ──────────────────────────────────────────────────────────────────

// Fixed radius in surface pixels; deliberately independent of image size.
const MARKER_RADIUS: f32 = 10.0;

fn marker_color() -> egui::Color32 {
    egui::Color32::from_rgba_unmultiplied(255, 0, 0, 128)
}

// ── App ─────────────────────────────────────────────────────────────────────

struct PinpointApp {
    asset: Option<ImageAsset>,
    texture: Option<egui::TextureHandle>,
    point: NormalizedPoint,
    coord_text: String,
    status: Option<String>,

    load_generation: u64,
    decode_tx: Sender<DecodeOutcome>,
    decode_rx: Receiver<DecodeOutcome>,
}

impl PinpointApp {
    fn new() -> Self {
        let (decode_tx, decode_rx) = mpsc::channel();
        Self {
            asset: None,
            texture: None,
            point: NormalizedPoint::default(),
            coord_text: String::new(),
            status: None,
            load_generation: 0,
            decode_tx,
            decode_rx,
        }
    }

    fn request_load(&mut self, path: PathBuf, ctx: egui::Context) {
        self.load_generation += 1;
        let generation = self.load_generation;
        let tx = self.decode_tx.clone();
        log::info!("loading {}", path.display());
        std::thread::spawn(move || {
            let result = load_image(&path);
            if tx.send(DecodeOutcome { generation, result }).is_ok() {
                ctx.request_repaint();
            }
        });
    }

    fn poll_decodes(&mut self) {
        while let Ok(outcome) = self.decode_rx.try_recv() {
            if outcome.generation != self.load_generation {
                log::debug!(
                    "dropping decode for superseded request {}",
                    outcome.generation
                );
                continue;
            }
            match outcome.result {
                Ok(asset) => {
                    log::info!("loaded {}x{} image", asset.width(), asset.height());
                    self.asset = Some(asset);
                    self.texture = None;
                    self.status = None;
                }
                Err(err) => {
                    // Previous asset stays on screen.
                    log::warn!("image load failed: {err}");
                    self.status = Some(err.to_string());
                }
            }
        }
    }

    fn ensure_texture(&mut self, ctx: &egui::Context) {
        if self.texture.is_some() {
            return;
        }
        if let Some(ref asset) = self.asset {
            let size = [asset.width() as usize, asset.height() as usize];
            let pixels = asset.rgba.as_flat_samples();
            let color_image =
                egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice());
            self.texture = Some(ctx.load_texture(
                "image",
                color_image,
                egui::TextureOptions::LINEAR,
            ));
        }
    }

    fn commit_coordinate_text(&mut self) {
        match parse_coordinates(&self.coord_text) {
            Ok(point) => {
                self.point = point;
                self.coord_text = point.canonical_text();
                self.status = None;
            }
            Err(err) => {
                // Leave the text as typed so the user can correct it.
                log::debug!("rejected coordinate text {:?}", self.coord_text);
                self.status = Some(err.to_string());
            }
        }
    }

    fn axis_input(&mut self, ui: &mut egui::Ui, axis: Axis) {
        let mut value = match axis {
            Axis::X => self.point.x,
            Axis::Y => self.point.y,
        };
        let response = ui
            .add(egui::DragValue::new(&mut value).speed(0.5))
            .on_hover_text("0–100");
        if response.changed() {
            self.point.set_axis(axis, value);
        }
    }

    fn controls_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Open image…").clicked() {
                let picked = rfd::FileDialog::new()
                    .add_filter(
                        "Images",
                        &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"],
                    )
                    .pick_file();
                if let Some(path) = picked {
                    self.request_load(path, ui.ctx().clone());
                }
            }
            ui.separator();

            ui.label("X (%):");
            self.axis_input(ui, Axis::X);
            ui.label("Y (%):");
            self.axis_input(ui, Axis::Y);
            ui.separator();

            ui.label("Paste coordinates:");
            let edit = ui.add(
                egui::TextEdit::singleline(&mut self.coord_text)
                    .hint_text("e.g. (50,50) or 50,50")
                    .desired_width(140.0),
            );
            let entered =
                edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.button("Set").clicked() || entered {
                self.commit_coordinate_text();
            }

            if let Some(ref status) = self.status {
                ui.separator();
                ui.colored_label(egui::Color32::LIGHT_RED, status);
            }
        });
    }

    /// Draws the image at 1:1 scale with the marker on top. Skipped entirely
    /// while no image is loaded.
    fn surface_ui(&mut self, ui: &mut egui::Ui) {
        let (Some(asset), Some(texture)) = (&self.asset, &self.texture) else {
            return;
        };
        let size = egui::vec2(asset.width() as f32, asset.height() as f32);
        let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
        let rect = response.rect;

        painter.image(
            texture.id(),
            rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );

        let center =
            rect.min + self.point.to_pixel(asset.width(), asset.height()).to_vec2();
        painter.circle_filled(center, MARKER_RADIUS, marker_color());
    }
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for PinpointApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_decodes();
        self.ensure_texture(ctx);

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            self.controls_ui(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::both().show(ui, |ui| {
                self.surface_ui(ui);
            });
        });
    }
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 768.0])
            .with_title("pinpoint"),
        ..Default::default()
    };

    eframe::run_native(
        "pinpoint",
        options,
        Box::new(|_cc| Ok(Box::new(PinpointApp::new()))),
    )
    .expect("Failed to run eframe");
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_point_is_image_center() {
        let p = NormalizedPoint::default();
        assert_relative_eq!(p.x, 50.0);
        assert_relative_eq!(p.y, 50.0);
    }

    #[test]
    fn set_axis_clamps_to_range() {
        let mut p = NormalizedPoint::default();
        p.set_axis(Axis::X, -13.0);
        assert_relative_eq!(p.x, 0.0);
        p.set_axis(Axis::X, 250.0);
        assert_relative_eq!(p.x, 100.0);
        p.set_axis(Axis::X, 37.5);
        assert_relative_eq!(p.x, 37.5);
        // Y untouched throughout.
        assert_relative_eq!(p.y, 50.0);

        p.set_axis(Axis::Y, 101.0);
        assert_relative_eq!(p.y, 100.0);
        assert_relative_eq!(p.x, 37.5);
    }

    #[test]
    fn parses_bare_pair() {
        let p = parse_coordinates("50,50").unwrap();
        assert_relative_eq!(p.x, 50.0);
        assert_relative_eq!(p.y, 50.0);
        assert_eq!(p.canonical_text(), "50,50");
    }

    #[test]
    fn parses_parenthesized_pair_with_decimals() {
        let p = parse_coordinates("(12.5, 87)").unwrap();
        assert_relative_eq!(p.x, 12.5);
        assert_relative_eq!(p.y, 87.0);
    }

    #[test]
    fn parses_whitespace_padded_pair() {
        let p = parse_coordinates(" 0 , 100 ").unwrap();
        assert_relative_eq!(p.x, 0.0);
        assert_relative_eq!(p.y, 100.0);
    }

    #[test]
    fn clamps_out_of_range_matches() {
        let p = parse_coordinates("150,20").unwrap();
        assert_relative_eq!(p.x, 100.0);
        assert_relative_eq!(p.y, 20.0);
        assert_eq!(p.canonical_text(), "100,20");
    }

    #[test]
    fn rejects_negative_numbers() {
        // The second number fails the grammar, so the whole string is rejected
        // even though 150 alone would have clamped.
        assert_eq!(parse_coordinates("150,-20"), Err(ParseError));
    }

    #[test]
    fn rejects_non_coordinate_text() {
        assert_eq!(parse_coordinates("banana"), Err(ParseError));
        assert_eq!(parse_coordinates(""), Err(ParseError));
        assert_eq!(parse_coordinates("50"), Err(ParseError));
        assert_eq!(parse_coordinates("1e2,5"), Err(ParseError));
    }

    #[test]
    fn accepts_unbalanced_parentheses() {
        // Each parenthesis is independently optional.
        let p = parse_coordinates("(50,50").unwrap();
        assert_relative_eq!(p.x, 50.0);
        assert_relative_eq!(p.y, 50.0);
    }

    #[test]
    fn canonical_text_round_trips() {
        let first = parse_coordinates("(12.5, 87)").unwrap();
        let second = parse_coordinates(&first.canonical_text()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.canonical_text(), second.canonical_text());
    }

    #[test]
    fn marker_position_is_proportional() {
        let p = NormalizedPoint::new(50.0, 50.0);
        assert_eq!(p.to_pixel(200, 100), egui::pos2(100.0, 50.0));

        let origin = NormalizedPoint::new(0.0, 0.0);
        assert_eq!(origin.to_pixel(200, 100), egui::pos2(0.0, 0.0));

        let corner = NormalizedPoint::new(100.0, 100.0);
        assert_eq!(corner.to_pixel(200, 100), egui::pos2(200.0, 100.0));
    }

    #[test]
    fn marker_geometry_is_deterministic() {
        let p = NormalizedPoint::new(33.3, 66.6);
        assert_eq!(p.to_pixel(640, 480), p.to_pixel(640, 480));
        assert_eq!(marker_color(), marker_color());
    }

    #[test]
    fn decodes_png_bytes() {
        let img = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let asset = decode_image(&bytes).unwrap();
        assert_eq!(asset.width(), 3);
        assert_eq!(asset.height(), 2);
    }

    #[test]
    fn rejects_non_image_bytes() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DecodeError::Decode(_)));
    }
}
