//! Benchmarks for image resolution and rewriting.
//!
//! Run with: cargo bench
//!
//! Results are saved to `target/criterion/` with HTML reports.
#![allow(clippy::expect_used, clippy::cast_possible_truncation)]

#[path = "../tests/fixtures/mod.rs"]
mod fixtures;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fixtures::{data_sheet_xlsx, SheetBuilder, XlsxBuilder, PNG_BYTES};
use std::convert::Infallible;
use xlimages::{resolve_bytes, Workbook};

/// Workbook with `sheets` sheets of `images` one-cell images each, plus a
/// column of text so grids are not empty.
fn image_grid_xlsx(sheets: usize, images: usize) -> Vec<u8> {
    let mut builder = XlsxBuilder::new();
    for s in 0..sheets {
        let mut sheet = SheetBuilder::new(&format!("Sheet{}", s + 1));
        for i in 0..images {
            let row = i as u32;
            sheet = sheet
                .text(&format!("A{}", row + 1), &format!("item {i}"))
                .one_cell_image(
                    &format!("rId{}", i + 1),
                    &format!("image{}.png", i + 1),
                    PNG_BYTES,
                    (row, 1),
                );
        }
        builder = builder.sheet(sheet);
    }
    builder.build()
}

/// Resolve the single-image workbook
fn bench_resolve_single(c: &mut Criterion) {
    let data = data_sheet_xlsx();

    c.bench_function("resolve_single_image", |b| {
        b.iter(|| resolve_bytes(black_box(&data)).expect("Failed to resolve"))
    });
}

/// Resolve workbooks with a growing number of images per sheet
fn bench_resolve_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_images_per_sheet");

    for images in [10, 100, 500] {
        let data = image_grid_xlsx(4, images);
        group.throughput(Throughput::Elements((4 * images) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(images), &data, |b, data| {
            b.iter(|| resolve_bytes(black_box(data)).expect("Failed to resolve"))
        });
    }

    group.finish();
}

/// Load, rewrite every image cell and save
fn bench_transform_and_save(c: &mut Criterion) {
    let data = image_grid_xlsx(2, 200);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Failed to build runtime");

    c.bench_function("transform_and_save_400_images", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut workbook = Workbook::from_bytes(black_box(&data)).expect("Failed to load");
                workbook
                    .transform(|file, _| {
                        let url = format!("https://cdn.example/{}", file.file_name());
                        async move { Ok::<_, Infallible>(url) }
                    })
                    .await
                    .expect("Failed to transform");
                workbook.save().expect("Failed to save")
            })
        })
    });
}

criterion_group!(
    benches,
    bench_resolve_single,
    bench_resolve_scaling,
    bench_transform_and_save
);
criterion_main!(benches);
