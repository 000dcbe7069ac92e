//! Benchmarks for watermark rendering and compositing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use watermark_core::composite::composite;
use watermark_core::{
    Anchor, ImageWatermark, OutlineStyle, Placement, RenderRequest, Renderer, ShadowStyle,
    TextWatermark, WatermarkSpec,
};

fn base(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 120, 150])))
}

fn benchmark_text_render(c: &mut Criterion) {
    let renderer = Renderer::with_builtin_font();
    let image = base(1920, 1080);
    let placement = Placement::anchored(Anchor::BottomRight);
    let mut group = c.benchmark_group("text_render");

    for degrees in [0, 30, 90] {
        let spec = WatermarkSpec::text(TextWatermark {
            shadow: Some(ShadowStyle {
                blur_radius_px: 2,
                ..ShadowStyle::default()
            }),
            outline: Some(OutlineStyle {
                color: watermark_core::Color::black(),
                width_px: 2,
            }),
            ..TextWatermark::new("Benchmark Watermark")
        })
        .with_rotation(degrees);

        group.bench_with_input(BenchmarkId::from_parameter(degrees), &spec, |b, spec| {
            b.iter(|| renderer.render(&RenderRequest::new(black_box(&image), spec, &placement)));
        });
    }
    group.finish();
}

fn benchmark_image_render(c: &mut Criterion) {
    let renderer = Renderer::default();
    let image = base(1920, 1080);
    let logo = ImageWatermark::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        400,
        200,
        Rgba([255, 255, 255, 200]),
    )));
    let spec = WatermarkSpec::image(ImageWatermark {
        scale_percent: 50,
        ..logo
    })
    .with_rotation(45);
    let placement = Placement::anchored(Anchor::Center);

    c.bench_function("image_render_rotated", |b| {
        b.iter(|| renderer.render(&RenderRequest::new(black_box(&image), &spec, &placement)));
    });
}

fn benchmark_composite(c: &mut Criterion) {
    let image = base(1920, 1080);
    let layer = RgbaImage::from_pixel(600, 300, Rgba([255, 255, 255, 128]));

    c.bench_function("composite_600x300", |b| {
        b.iter(|| composite(black_box(&image), black_box(&layer), 100, 100));
    });
}

criterion_group!(
    benches,
    benchmark_text_render,
    benchmark_image_render,
    benchmark_composite
);
criterion_main!(benches);
