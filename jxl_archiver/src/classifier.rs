//! Format classification by magic bytes, animation detection, and
//! live-photo pairing.
//!
//! Classification never trusts the file extension: a renamed or
//! mislabeled file is common enough in real photo libraries that every
//! decision downstream (which plan to build, which verifier to run) is
//! keyed off the sniffed format instead.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Png,
    Jpeg,
    Gif,
    WebP,
    Heic,
    Heif,
    Avif,
    Jxl,
    Tiff,
    Bmp,
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Jpeg => "jpeg",
            Format::Gif => "gif",
            Format::WebP => "webp",
            Format::Heic => "heic",
            Format::Heif => "heif",
            Format::Avif => "avif",
            Format::Jxl => "jxl",
            Format::Tiff => "tiff",
            Format::Bmp => "bmp",
        }
    }
}

/// A classified input file: sniffed format, whether it's animated, and
/// whether a sibling `.mov` makes it a live-photo pair.
#[derive(Debug, Clone)]
pub struct Classification {
    pub format: Option<Format>,
    pub animated: bool,
    pub is_live_photo: bool,
}

const MAX_SNIFF: usize = 64 * 1024;

/// Sniff `path`'s format from its leading bytes. Returns `None` when the
/// header doesn't match any recognized signature.
pub fn detect_format_from_bytes(buf: &[u8]) -> Option<Format> {
    if buf.len() >= 8 && buf[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        return Some(Format::Png);
    }
    if buf.len() >= 3 && buf[0..3] == [0xFF, 0xD8, 0xFF] {
        return Some(Format::Jpeg);
    }
    if buf.len() >= 6 && (&buf[0..6] == b"GIF87a" || &buf[0..6] == b"GIF89a") {
        return Some(Format::Gif);
    }
    if buf.len() >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WEBP" {
        return Some(Format::WebP);
    }
    if buf.len() >= 2 && (&buf[0..2] == b"II" || &buf[0..2] == b"MM") {
        // TIFF: "II*\0" or "MM\0*"
        if buf.len() >= 4 && ((buf[2] == 0x2A && buf[3] == 0x00) || (buf[2] == 0x00 && buf[3] == 0x2A)) {
            return Some(Format::Tiff);
        }
    }
    if buf.len() >= 2 && &buf[0..2] == b"BM" {
        return Some(Format::Bmp);
    }
    if buf.len() >= 2 && buf[0] == 0xFF && buf[1] == 0x0A {
        return Some(Format::Jxl);
    }
    if buf.len() >= 12 && &buf[0..12] == [0x00, 0x00, 0x00, 0x0C, 0x4A, 0x58, 0x4C, 0x20, 0x0D, 0x0A, 0x87, 0x0A] {
        return Some(Format::Jxl);
    }
    if buf.len() >= 12 && &buf[4..8] == b"ftyp" {
        let brand = &buf[8..12];
        return match brand {
            b"heic" | b"heix" | b"hevc" | b"hevx" => Some(Format::Heic),
            b"mif1" | b"msf1" | b"heim" | b"heis" => Some(Format::Heif),
            b"avif" | b"avis" => Some(Format::Avif),
            _ => None,
        };
    }
    None
}

pub fn classify(path: &Path) -> std::io::Result<Classification> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; MAX_SNIFF];
    let read = file.read(&mut buf)?;
    buf.truncate(read);

    let format = detect_format_from_bytes(&buf);
    let animated = format.map(|f| detect_animation(f, &mut file, &buf)).unwrap_or(false);
    let is_live_photo = has_live_photo_sibling(path);

    Ok(Classification {
        format,
        animated,
        is_live_photo,
    })
}

fn detect_animation(format: Format, file: &mut File, head: &[u8]) -> bool {
    match format {
        Format::Gif => count_gif_frames(file) > 1,
        Format::Png => has_actl_chunk(file),
        Format::WebP => is_animated_webp(head, file),
        _ => false,
    }
}

/// Count GIF frames by scanning for Image Descriptor blocks (`0x2C`).
/// Stops early once a second frame is found since only animated-or-not
/// matters, not the exact count.
fn count_gif_frames(file: &mut File) -> usize {
    let _ = file.seek(SeekFrom::Start(0));
    let mut data = Vec::new();
    if file.read_to_end(&mut data).is_err() {
        return 0;
    }
    let mut count = 0;
    let mut i = 13; // skip header + logical screen descriptor
    while i < data.len() {
        match data[i] {
            0x2C => {
                count += 1;
                if count > 1 {
                    return count;
                }
                // Image descriptor: 9 bytes + optional local color table, then LZW min code + sub-blocks
                if i + 10 > data.len() {
                    break;
                }
                let packed = data[i + 9];
                let local_table = if packed & 0x80 != 0 {
                    2usize.pow(((packed & 0x07) + 1) as u32) * 3
                } else {
                    0
                };
                i += 10 + local_table + 1; // +1 for LZW min code size
                i = skip_sub_blocks(&data, i);
            }
            0x21 => {
                // Extension block: label + sub-blocks
                i += 2;
                i = skip_sub_blocks(&data, i);
            }
            0x3B => break, // trailer
            _ => i += 1,
        }
    }
    count
}

fn skip_sub_blocks(data: &[u8], mut i: usize) -> usize {
    while i < data.len() {
        let len = data[i] as usize;
        if len == 0 {
            return i + 1;
        }
        i += 1 + len;
    }
    i
}

/// PNG animations carry an `acTL` chunk before `IDAT`.
fn has_actl_chunk(file: &mut File) -> bool {
    let _ = file.seek(SeekFrom::Start(8));
    let mut data = Vec::new();
    if file.read_to_end(&mut data).is_err() {
        return false;
    }
    let mut i = 0;
    while i + 8 <= data.len() {
        let len = u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]) as usize;
        let chunk_type = &data[i + 4..i + 8];
        if chunk_type == b"acTL" {
            return true;
        }
        if chunk_type == b"IDAT" {
            return false;
        }
        i += 8 + len + 4; // length + type + data + crc
    }
    false
}

/// WebP animation requires both the `VP8X` flag bit 0x02 and an `ANIM`
/// chunk; the flag alone is necessary but not sufficient.
fn is_animated_webp(head: &[u8], file: &mut File) -> bool {
    if head.len() < 21 || &head[12..16] != b"VP8X" {
        return false;
    }
    let flags = head[20];
    if flags & 0x02 == 0 {
        return false;
    }
    let _ = file.seek(SeekFrom::Start(0));
    let mut data = Vec::new();
    if file.read_to_end(&mut data).is_err() {
        return false;
    }
    data.windows(4).any(|w| w == b"ANIM")
}

/// A live photo pairs `name.ext` with a sibling `name.mov`.
fn has_live_photo_sibling(path: &Path) -> bool {
    let Some(stem) = path.file_stem() else {
        return false;
    };
    path.with_file_name(stem).with_extension("mov").exists()
        || path.with_file_name(stem).with_extension("MOV").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_png_signature() {
        let sig = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(detect_format_from_bytes(&sig), Some(Format::Png));
    }

    #[test]
    fn detects_jpeg_signature() {
        assert_eq!(detect_format_from_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(Format::Jpeg));
    }

    #[test]
    fn detects_gif_signature() {
        assert_eq!(detect_format_from_bytes(b"GIF89a\0\0\0\0"), Some(Format::Gif));
    }

    #[test]
    fn detects_webp_signature() {
        let mut buf = b"RIFF".to_vec();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(b"WEBP");
        assert_eq!(detect_format_from_bytes(&buf), Some(Format::WebP));
    }

    #[test]
    fn detects_jxl_codestream_and_container_signatures() {
        assert_eq!(detect_format_from_bytes(&[0xFF, 0x0A]), Some(Format::Jxl));
        let container = [0x00, 0x00, 0x00, 0x0C, 0x4A, 0x58, 0x4C, 0x20, 0x0D, 0x0A, 0x87, 0x0A];
        assert_eq!(detect_format_from_bytes(&container), Some(Format::Jxl));
    }

    #[test]
    fn detects_heic_brand() {
        let mut buf = vec![0, 0, 0, 24];
        buf.extend_from_slice(b"ftyp");
        buf.extend_from_slice(b"heic");
        assert_eq!(detect_format_from_bytes(&buf), Some(Format::Heic));
    }

    #[test]
    fn detects_avif_brand() {
        let mut buf = vec![0, 0, 0, 24];
        buf.extend_from_slice(b"ftyp");
        buf.extend_from_slice(b"avif");
        assert_eq!(detect_format_from_bytes(&buf), Some(Format::Avif));
    }

    #[test]
    fn unknown_bytes_yield_none() {
        assert_eq!(detect_format_from_bytes(b"not an image"), None);
    }

    #[test]
    fn gif_frame_counter_stops_after_second_frame() {
        let mut data = b"GIF89a".to_vec();
        data.extend_from_slice(&[0u8; 7]); // logical screen descriptor
        for _ in 0..2 {
            data.push(0x2C);
            data.extend_from_slice(&[0u8; 9]); // image descriptor body
            data.push(2); // LZW min code size
            data.push(0); // block terminator
        }
        data.push(0x3B);
        let count = count_gif_frames_from_slice(&data);
        assert!(count > 1);
    }

    fn count_gif_frames_from_slice(data: &[u8]) -> usize {
        let mut i = 13;
        let mut count = 0;
        while i < data.len() {
            match data[i] {
                0x2C => {
                    count += 1;
                    if count > 1 {
                        return count;
                    }
                    if i + 10 > data.len() {
                        break;
                    }
                    let packed = data[i + 9];
                    let local_table = if packed & 0x80 != 0 {
                        2usize.pow(((packed & 0x07) + 1) as u32) * 3
                    } else {
                        0
                    };
                    i += 10 + local_table + 1;
                    i = skip_sub_blocks(data, i);
                }
                0x21 => {
                    i += 2;
                    i = skip_sub_blocks(data, i);
                }
                0x3B => break,
                _ => i += 1,
            }
        }
        count
    }
}
