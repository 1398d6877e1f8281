use serde::{Deserialize, Serialize};

/// RGB color with 8-bit channels. Serialized as a `[r, g, b]` triple, the same
/// shape agents pass to capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

impl From<Color> for [u8; 3] {
    fn from(c: Color) -> Self {
        [c.r, c.g, c.b]
    }
}

/// Named colors understood by `color("name")` and by capability arguments.
const NAMED_COLORS: &[(&str, Color)] = &[
    ("black", Color::rgb(0, 0, 0)),
    ("white", Color::rgb(255, 255, 255)),
    ("red", Color::rgb(255, 0, 0)),
    ("green", Color::rgb(0, 255, 0)),
    ("blue", Color::rgb(0, 0, 255)),
    ("yellow", Color::rgb(255, 255, 0)),
    ("cyan", Color::rgb(0, 255, 255)),
    ("magenta", Color::rgb(255, 0, 255)),
    ("orange", Color::rgb(255, 165, 0)),
    ("purple", Color::rgb(128, 0, 128)),
    ("violet", Color::rgb(238, 130, 238)),
    ("pink", Color::rgb(255, 192, 203)),
    ("gold", Color::rgb(255, 215, 0)),
    ("amber", Color::rgb(255, 191, 0)),
    ("teal", Color::rgb(0, 128, 128)),
    ("indigo", Color::rgb(75, 0, 130)),
    ("lime", Color::rgb(50, 205, 50)),
    ("turquoise", Color::rgb(64, 224, 208)),
    ("warm_white", Color::rgb(255, 214, 170)),
    ("off", Color::rgb(0, 0, 0)),
];

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from integer channels, rejecting anything outside 0-255.
    pub fn from_channels(channels: &[i64]) -> Result<Self, String> {
        let [r, g, b] = channels else {
            return Err(format!(
                "expected 3 channels [r, g, b], got {}",
                channels.len()
            ));
        };
        let channel = |v: i64, name: &str| {
            u8::try_from(v).map_err(|_| format!("{name} channel {v} is outside 0-255"))
        };
        Ok(Self::rgb(channel(*r, "red")?, channel(*g, "green")?, channel(*b, "blue")?))
    }

    /// Create from HSV (hue in degrees, saturation 0-1, value 0-1).
    /// Hue wraps; saturation and value are clamped.
    pub fn from_hsv(h: f64, s: f64, v: f64) -> Self {
        let h = h.rem_euclid(360.0);
        let s = s.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        let c = v * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = v - c;

        let (r1, g1, b1) = match h as u16 {
            0..60 => (c, x, 0.0),
            60..120 => (x, c, 0.0),
            120..180 => (0.0, c, x),
            180..240 => (0.0, x, c),
            240..300 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        Self::rgb(unit_to_u8(r1 + m), unit_to_u8(g1 + m), unit_to_u8(b1 + m))
    }

    /// Inverse of [`Color::from_hsv`]: (hue 0-360, saturation 0-1, value 0-1).
    pub fn to_hsv(self) -> (f64, f64, f64) {
        let r = f64::from(self.r) / 255.0;
        let g = f64::from(self.g) / 255.0;
        let b = f64::from(self.b) / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let h = if delta <= f64::EPSILON {
            0.0
        } else if (max - r).abs() <= f64::EPSILON {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if (max - g).abs() <= f64::EPSILON {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let s = if max <= f64::EPSILON { 0.0 } else { delta / max };
        (h, s, max)
    }

    /// Linear interpolation between two colors. t is clamped to [0, 1].
    pub fn lerp(self, other: Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| {
            let v = f64::from(a) * (1.0 - t) + f64::from(b) * t;
            v.round().clamp(0.0, 255.0) as u8
        };
        Self::rgb(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }

    /// Resolve a color name (case-insensitive, spaces or dashes allowed) or a
    /// `#rgb` / `#rrggbb` hex string.
    pub fn from_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        if let Some(hex) = trimmed.strip_prefix('#') {
            return parse_hex(hex);
        }
        let key = trimmed.to_ascii_lowercase().replace([' ', '-'], "_");
        NAMED_COLORS
            .iter()
            .find(|(n, _)| *n == key)
            .map(|(_, c)| *c)
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        NAMED_COLORS.iter().map(|(n, _)| *n)
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

fn unit_to_u8(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn parse_hex(hex: &str) -> Option<Color> {
    let digit = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let r = digit(hex.get(0..1)?)?;
            let g = digit(hex.get(1..2)?)?;
            let b = digit(hex.get(2..3)?)?;
            Some(Color::rgb(r * 17, g * 17, b * 17))
        }
        6 => Some(Color::rgb(
            digit(hex.get(0..2)?)?,
            digit(hex.get(2..4)?)?,
            digit(hex.get(4..6)?)?,
        )),
        _ => None,
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}]", self.r, self.g, self.b)
    }
}
