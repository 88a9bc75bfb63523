//! In-memory test fixtures: images, EXIF blobs and zip archives.

use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::{Cursor, Read, Write};

fn encode(format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([200, 40, 90])));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), format).unwrap();
    out
}

pub fn png_bytes() -> Vec<u8> {
    encode(ImageFormat::Png)
}

pub fn jpeg_bytes() -> Vec<u8> {
    encode(ImageFormat::Jpeg)
}

/// Bare TIFF-structured EXIF blob holding the given ASCII date tags.
pub fn exif_blob(tags: &[(Tag, &str)]) -> Vec<u8> {
    let fields: Vec<Field> = tags
        .iter()
        .map(|(tag, v)| Field {
            tag: *tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![v.as_bytes().to_vec()]),
        })
        .collect();
    let mut writer = Writer::new();
    for f in &fields {
        writer.push_field(f);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false).unwrap();
    buf.into_inner()
}

/// A JPEG with an APP1 Exif segment carrying `DateTimeOriginal`.
pub fn jpeg_with_exif(datetime_original: &str) -> Vec<u8> {
    let jpeg = jpeg_bytes();
    let mut app1 = b"Exif\0\0".to_vec();
    app1.extend(exif_blob(&[(Tag::DateTimeOriginal, datetime_original)]));
    let len = (app1.len() + 2) as u16;
    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend(len.to_be_bytes());
    out.extend(app1);
    out.extend(&jpeg[2..]);
    out
}

/// Build a zip from `(name, bytes)` entries; names ending in `/` become directories.
pub fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    for (name, data) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
    }
    zip.finish().unwrap().into_inner()
}

/// Names and contents of every entry, in archive order.
pub fn unzip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        out.push((entry.name().to_string(), data));
    }
    out
}
