use criterion::{criterion_group, criterion_main, Criterion, black_box};

use hairpeel::asset::{
    AssetRegistry, DecodedImage, TextureCategory, TextureSource, TransferFormat,
};
use hairpeel::core::config::CompositeOrder;
use hairpeel::render::hair::{plan_peel, LayerSet, LayerSetPlan, PeelCount, PeelPlan};
use hairpeel::streaming::{HeadlessTexture, HeadlessUploadBackend, TextureStreamer};

fn rgba_image(size: u32) -> DecodedImage {
    DecodedImage {
        width: size,
        height: size,
        channels: 4,
        format: TransferFormat::Uncompressed { channels: 4 },
        levels: 1,
        data: vec![200; (size * size * 4) as usize],
    }
}

fn loaded_registry(count: usize, size: u32) -> AssetRegistry<HeadlessTexture> {
    let mut registry = AssetRegistry::new();
    for i in 0..count {
        let source = TextureSource::new(format!("T{i}_ALB.png"), TextureCategory::Uncompressed);
        let (id, _) = registry.register_texture(source);
        if let Some(texture) = registry.texture_mut(id) {
            texture.begin_loading().ok();
            texture.finish_loading(rgba_image(size)).ok();
        }
    }
    registry
}

fn bench_stream_all(c: &mut Criterion) {
    c.bench_function("stream_64_textures_4_slots", |b| {
        b.iter_with_setup(
            || loaded_registry(64, 64),
            |mut registry| {
                let mut streamer = TextureStreamer::with_pool(HeadlessUploadBackend::new(), 4, 1 << 20, false);
                while !streamer.loading_complete(&registry) {
                    streamer.tick(&mut registry);
                    streamer.backend_mut().signal_all();
                }
                black_box(streamer.stats())
            },
        );
    });
}

fn bench_idle_tick(c: &mut Criterion) {
    let mut registry = loaded_registry(256, 4);
    let mut streamer = TextureStreamer::with_pool(HeadlessUploadBackend::new(), 4, 1 << 16, false);
    while !streamer.loading_complete(&registry) {
        streamer.tick(&mut registry);
        streamer.backend_mut().signal_all();
    }

    c.bench_function("tick_256_resident", |b| {
        b.iter(|| black_box(streamer.tick(&mut registry)));
    });
}

fn bench_write_staged(c: &mut Criterion) {
    let image = rgba_image(1024);
    let format = image.format;
    let regions = format.copy_regions(image.width, image.height, 1);
    let mut staging = vec![0u8; TransferFormat::staged_size(&regions) as usize];

    c.bench_function("write_staged_1024_rgba", |b| {
        b.iter(|| format.write_staged(black_box(&image), &regions, &mut staging));
    });
}

fn bench_plan_peel(c: &mut Criterion) {
    let sets = [
        LayerSetPlan {
            set: LayerSet::Top,
            order: CompositeOrder::FrontToBack,
            items: 3,
        },
        LayerSetPlan {
            set: LayerSet::Under,
            order: CompositeOrder::BackToFront,
            items: 2,
        },
    ];
    let mut plan = PeelPlan::default();

    c.bench_function("plan_peel_7_layers", |b| {
        b.iter(|| {
            plan_peel(black_box(PeelCount::new(7)), &sets, &mut plan);
            black_box(plan.result)
        });
    });
}

criterion_group!(
    benches,
    bench_stream_all,
    bench_idle_tick,
    bench_write_staged,
    bench_plan_peel,
);
criterion_main!(benches);
