//! Policy for turning a [`ProbeResult`](super::ProbeResult) into the fields
//! a Track is created/updated from (spec.md §4.5 "Policy for deriving track
//! fields from probe output").

use super::ProbeResult;
use crate::store::{TrackFields, TrackTags};

pub fn derive_track_fields(probe: &ProbeResult) -> TrackFields {
    let audio_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio");

    let codec = audio_stream
        .map(|s| s.codec_name.clone())
        .unwrap_or_default();

    let bit_depth = audio_stream
        .and_then(|s| {
            s.bits_per_sample
                .or(s.bits_per_raw_sample)
                .or(s.bits_per_coded_sample)
        })
        .unwrap_or_else(|| {
            if matches!(codec.as_str(), "flac" | "alac") {
                16
            } else {
                0
            }
        });

    let has_artwork = probe.streams.iter().any(|s| {
        s.codec_type == "video" && s.disposition.get("attached_pic").copied().unwrap_or(0) == 1
    });

    TrackFields {
        duration_secs: probe.format.duration.unwrap_or(0.0),
        codec,
        sample_rate_hz: audio_stream.and_then(|s| s.sample_rate).unwrap_or(0),
        bit_depth,
        channels: audio_stream.and_then(|s| s.channels).unwrap_or(0),
        bitrate: audio_stream
            .and_then(|s| s.bitrate)
            .or(probe.format.bitrate),
        tags: derive_tags(probe),
        has_artwork,
    }
}

/// Case-insensitive tag lookup merged across format-level and audio
/// stream-level tag maps (stream tags take precedence — they are usually
/// the most specific). Lower-cased keys are preferred per spec.md §4.5.
fn tag_lookup<'a>(probe: &'a ProbeResult, key: &str) -> Option<&'a str> {
    let audio_tags = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .map(|s| &s.tags);

    for map in [audio_tags, Some(&probe.format.tags)].into_iter().flatten() {
        if let Some(v) = map.get(key) {
            return Some(v.as_str());
        }
        if let Some((_, v)) = map.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            return Some(v.as_str());
        }
    }
    None
}

fn split_numerator(raw: &str) -> Option<i64> {
    raw.split('/').next()?.trim().parse().ok()
}

fn leading_year(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 4 {
        digits[..4].parse().ok()
    } else {
        None
    }
}

fn derive_tags(probe: &ProbeResult) -> TrackTags {
    let year = tag_lookup(probe, "date")
        .or_else(|| tag_lookup(probe, "year"))
        .and_then(leading_year);

    TrackTags {
        title: tag_lookup(probe, "title").map(str::to_string),
        artist: tag_lookup(probe, "artist").map(str::to_string),
        album: tag_lookup(probe, "album").map(str::to_string),
        album_artist: tag_lookup(probe, "album_artist").map(str::to_string),
        track_number: tag_lookup(probe, "track").and_then(split_numerator),
        disc_number: tag_lookup(probe, "disc").and_then(split_numerator),
        year,
        genre: tag_lookup(probe, "genre").map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeFormat, ProbeStream};
    use std::collections::HashMap;

    fn sample_probe() -> ProbeResult {
        let mut format_tags = HashMap::new();
        format_tags.insert("ARTIST".to_string(), "The Artist".to_string());
        format_tags.insert("date".to_string(), "1999-03-02".to_string());

        let mut stream_tags = HashMap::new();
        stream_tags.insert("title".to_string(), "Song".to_string());
        stream_tags.insert("track".to_string(), "3/12".to_string());

        ProbeResult {
            format: ProbeFormat {
                filename: "/music/a.flac".into(),
                container_name: "flac".into(),
                duration: Some(245.3),
                size: Some(40_000_000),
                bitrate: Some(900_000),
                tags: format_tags,
            },
            streams: vec![ProbeStream {
                codec_type: "audio".into(),
                codec_name: "flac".into(),
                sample_rate: Some(44100),
                channels: Some(2),
                bits_per_sample: None,
                bits_per_raw_sample: Some(16),
                bits_per_coded_sample: None,
                bitrate: None,
                duration: Some(245.3),
                tags: stream_tags,
                disposition: HashMap::new(),
            }],
        }
    }

    #[test]
    fn bit_depth_prefers_bits_per_sample_then_falls_through() {
        let fields = derive_track_fields(&sample_probe());
        assert_eq!(fields.bit_depth, 16);
    }

    #[test]
    fn flac_defaults_bit_depth_to_16_when_unreported() {
        let mut probe = sample_probe();
        probe.streams[0].bits_per_raw_sample = None;
        let fields = derive_track_fields(&probe);
        assert_eq!(fields.bit_depth, 16);
    }

    #[test]
    fn tags_are_case_insensitive_and_split_track_numerator() {
        let fields = derive_track_fields(&sample_probe());
        assert_eq!(fields.tags.artist.as_deref(), Some("The Artist"));
        assert_eq!(fields.tags.title.as_deref(), Some("Song"));
        assert_eq!(fields.tags.track_number, Some(3));
        assert_eq!(fields.tags.year, Some(1999));
    }

    #[test]
    fn artwork_detected_from_attached_pic_disposition() {
        let mut probe = sample_probe();
        let mut disposition = HashMap::new();
        disposition.insert("attached_pic".to_string(), 1);
        probe.streams.push(ProbeStream {
            codec_type: "video".into(),
            codec_name: "mjpeg".into(),
            sample_rate: None,
            channels: None,
            bits_per_sample: None,
            bits_per_raw_sample: None,
            bits_per_coded_sample: None,
            bitrate: None,
            duration: None,
            tags: HashMap::new(),
            disposition,
        });

        let fields = derive_track_fields(&probe);
        assert!(fields.has_artwork);
    }
}
