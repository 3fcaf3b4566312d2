use gallery_ingest::ingest::CleanupFailureKind;
use gallery_ingest::{
    DerivativeGenerator, DerivativeSet, FolderId, Gallery, GalleryConfig, IngestConfig,
    IngestError, SourceUpload,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

const SVG: &str = r#"<?xml version="1.0"?>
<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10"/></svg>"#;

fn folder(id: i64) -> FolderId {
    FolderId::new(id).unwrap()
}

fn generator(public_dir: &Path) -> DerivativeGenerator {
    DerivativeGenerator::new(&IngestConfig::default(), public_dir)
}

fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 90])
    }));
    let mut out = Vec::new();
    image.write_to(&mut Cursor::new(&mut out), format).unwrap();
    out
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

fn dimensions(public_dir: &Path, relative: &str) -> (u32, u32) {
    let image = image::open(public_dir.join(relative)).unwrap();
    (image.width(), image.height())
}

fn tier_dimensions(public_dir: &Path, set: &DerivativeSet) -> [(u32, u32); 3] {
    [
        dimensions(public_dir, &set.path_thumb),
        dimensions(public_dir, &set.path_low),
        dimensions(public_dir, &set.path_preview),
    ]
}

#[test]
fn default_tiers_respect_their_edge_ceilings() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());
    let bytes = image_bytes(2000, 1000, ImageFormat::Png);

    let set = generator
        .ingest(SourceUpload::from_bytes(folder(1), "wide.png", "image/png", bytes))
        .unwrap();

    assert_eq!(set.width, Some(2000));
    assert_eq!(set.height, Some(1000));
    assert_eq!(
        tier_dimensions(temp.path(), &set),
        [(500, 250), (1920, 960), (1920, 960)]
    );
    assert!(set.path_thumb.ends_with(".webp"));
    assert!(set.path_low.ends_with(".webp"));
}

#[test]
fn small_images_are_never_upscaled() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());
    let bytes = image_bytes(300, 200, ImageFormat::Png);

    let set = generator
        .ingest(SourceUpload::from_bytes(folder(1), "small.png", "image/png", bytes))
        .unwrap();

    assert_eq!(tier_dimensions(temp.path(), &set), [(300, 200); 3]);
}

#[test]
fn aspect_ratio_survives_scaling() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());
    let bytes = image_bytes(1234, 567, ImageFormat::Png);

    let set = generator
        .ingest(SourceUpload::from_bytes(folder(1), "odd.png", "image/png", bytes))
        .unwrap();

    let (width, height) = dimensions(temp.path(), &set.path_thumb);
    assert_eq!(width, 500);
    let expected = 567.0 * 500.0 / 1234.0;
    assert!((f64::from(height) - expected).abs() <= 1.0);
}

#[test]
fn hard_ceiling_rejects_before_anything_else() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());

    for mime in ["image/jpeg", "application/pdf", "image/svg+xml"] {
        let upload = SourceUpload::new(folder(1), "huge", mime, 51_200_001, Cursor::new(Vec::<u8>::new()));
        let err = generator.ingest(upload).unwrap_err();
        assert!(
            matches!(err, IngestError::HardSizeLimit { size: 51_200_001, .. }),
            "{mime}: {err:?}"
        );
        assert_eq!(err.status_code(), 413);
    }
    assert!(files_under(temp.path()).is_empty());
}

#[test]
fn small_svg_is_copied_verbatim_into_every_slot() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());

    let set = generator
        .ingest(SourceUpload::from_bytes(
            folder(2),
            "logo.svg",
            "image/svg+xml",
            SVG.as_bytes().to_vec(),
        ))
        .unwrap();

    assert!(set.is_passthrough());
    assert!(set.path_thumb.ends_with(".svg"));
    assert_eq!(set.width, None);
    assert_eq!(set.ratio, None);
    for path in set.paths() {
        assert_eq!(std::fs::read(temp.path().join(path)).unwrap(), SVG.as_bytes());
    }
    assert_eq!(files_under(temp.path()).len(), 1);
}

#[test]
fn large_svg_is_rejected() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());

    let upload = SourceUpload::new(
        folder(2),
        "big.svg",
        "image/svg+xml",
        1_024_001,
        Cursor::new(SVG.as_bytes().to_vec()),
    );
    let err = generator.ingest(upload).unwrap_err();

    assert!(matches!(err, IngestError::UnsupportedSize { .. }));
    assert_eq!(err.status_code(), 413);
    assert!(files_under(temp.path()).is_empty());
}

#[test]
fn gif_passthrough_depends_on_size() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());
    let gif = image_bytes(40, 30, ImageFormat::Gif);

    let small = generator
        .ingest(SourceUpload::from_bytes(folder(3), "a.gif", "image/gif", gif.clone()))
        .unwrap();
    assert!(small.is_passthrough());
    assert_eq!(std::fs::read(temp.path().join(&small.path_low)).unwrap(), gif);

    let declared_large = SourceUpload::new(
        folder(3),
        "b.gif",
        "image/gif",
        2_000_000,
        Cursor::new(gif),
    );
    let large = generator.ingest(declared_large).unwrap();
    let distinct: HashSet<&str> = large.paths().into_iter().collect();
    assert_eq!(distinct.len(), 3);
    assert!(large.path_preview.ends_with(".webp"));
    assert_eq!(large.width, Some(40));

    assert_eq!(files_under(temp.path()).len(), 4);
}

#[test]
fn unknown_mime_creates_no_files() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());

    let err = generator
        .ingest(SourceUpload::from_bytes(
            folder(1),
            "doc.pdf",
            "application/pdf",
            b"%PDF-1.7".to_vec(),
        ))
        .unwrap_err();

    assert!(matches!(err, IngestError::UnsupportedFormat { .. }));
    assert_eq!(err.status_code(), 415);
    assert!(files_under(temp.path()).is_empty());
}

#[test]
fn preview_keeps_native_format_only_when_small() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());
    let jpeg = image_bytes(64, 48, ImageFormat::Jpeg);

    let small = generator
        .ingest(SourceUpload::from_bytes(folder(1), "a.jpg", "image/jpeg", jpeg.clone()))
        .unwrap();
    assert!(small.path_preview.ends_with(".jpg"));

    let large = generator
        .ingest(SourceUpload::new(
            folder(1),
            "b.jpg",
            "IMAGE/JPEG; charset=binary",
            5_000_000,
            Cursor::new(jpeg),
        ))
        .unwrap();
    assert!(large.path_preview.ends_with(".webp"));
}

#[test]
fn cleanup_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());
    let set = generator
        .ingest(SourceUpload::from_bytes(
            folder(5),
            "a.png",
            "image/png",
            image_bytes(50, 50, ImageFormat::Png),
        ))
        .unwrap();

    let first = generator.cleanup(&set);
    assert_eq!(first.deleted_paths.len(), 3);
    assert!(first.is_complete());
    assert!(files_under(temp.path()).is_empty());

    let second = generator.cleanup(&set);
    assert!(second.deleted_paths.is_empty());
    assert_eq!(second.missing(), 3);
    assert!(second
        .failures
        .iter()
        .all(|f| f.kind == CleanupFailureKind::Missing));
}

#[test]
fn concurrent_uploads_into_new_folder() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());
    let bytes = image_bytes(80, 60, ImageFormat::Png);

    let sets: Vec<DerivativeSet> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let generator = &generator;
                let bytes = bytes.clone();
                scope.spawn(move || {
                    generator.ingest(SourceUpload::from_bytes(
                        folder(77),
                        format!("{i}.png"),
                        "image/png",
                        bytes,
                    ))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    });

    let all_paths: HashSet<&str> = sets.iter().flat_map(|s| s.paths()).collect();
    assert_eq!(all_paths.len(), 12);
    assert_eq!(files_under(temp.path()).len(), 12);
}

#[tokio::test(flavor = "multi_thread")]
async fn async_ingest_runs_on_blocking_pool() {
    let temp = TempDir::new().unwrap();
    let generator = Arc::new(generator(temp.path()));

    let upload = SourceUpload::from_bytes(
        folder(9),
        "a.bmp",
        "image/bmp",
        image_bytes(30, 20, ImageFormat::Bmp),
    );
    let set = generator.clone().ingest_async(upload).await.unwrap();

    assert!(set.path_preview.ends_with(".bmp"));
    assert_eq!(set.ratio, Some(1.5));
}

#[test]
fn gallery_round_trip_on_disk() {
    let temp = TempDir::new().unwrap();
    let config = GalleryConfig {
        public_dir: temp.path().join("public"),
        database: Some(temp.path().join("catalog/gallery.db")),
        ..GalleryConfig::default()
    };
    let gallery = Gallery::from_config(&config).unwrap();

    let record = gallery
        .upload(SourceUpload::from_bytes(
            folder(1),
            "a.png",
            "image/png",
            image_bytes(120, 80, ImageFormat::Png),
        ))
        .unwrap();

    let listed = gallery.list(folder(1)).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, record.id);
    assert_eq!(listed[0].width, Some(120));

    let outcomes = gallery.delete_images(&[record.id]).unwrap();
    assert_eq!(outcomes[0].report().unwrap().deleted_paths.len(), 3);
    assert!(gallery.list(folder(1)).unwrap().is_empty());
    assert!(files_under(&config.public_dir).is_empty());
}

#[cfg(feature = "avif-native")]
#[test]
fn avif_upload_is_decoded_and_scaled() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());
    let avif = image_bytes(640, 480, ImageFormat::Avif);

    let set = generator
        .ingest(SourceUpload::from_bytes(folder(6), "a.avif", "image/avif", avif))
        .unwrap();

    assert_eq!(set.width, Some(640));
    assert!(set.path_preview.ends_with(".avif"));
    assert_eq!(dimensions(temp.path(), &set.path_thumb), (500, 375));
}

#[cfg(not(feature = "avif-native"))]
#[test]
fn avif_upload_refused_without_decoder() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());
    let avif = image_bytes(64, 48, ImageFormat::Avif);

    let err = generator
        .ingest(SourceUpload::from_bytes(folder(6), "a.avif", "image/avif", avif))
        .unwrap_err();

    assert!(matches!(err, IngestError::UnsupportedFormat { .. }));
    assert_eq!(err.status_code(), 415);
    assert!(files_under(temp.path()).is_empty());
}

#[test]
fn understated_svg_size_is_measured() {
    let temp = TempDir::new().unwrap();
    let generator = generator(temp.path());
    let svg = format!("<svg xmlns=\"http://www.w3.org/2000/svg\"><!--{}--></svg>", " ".repeat(1_100_000));

    let upload = SourceUpload::new(folder(2), "big.svg", "image/svg+xml", 100, Cursor::new(svg.into_bytes()));
    let err = generator.ingest(upload).unwrap_err();

    assert!(matches!(err, IngestError::UnsupportedSize { .. }));
    assert!(files_under(temp.path()).is_empty());
}
