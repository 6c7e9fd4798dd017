use criterion::{criterion_group, criterion_main, Criterion, black_box};
use piedense::kernel::{fully_connected_reference, fully_connected_with_bias};
use piedense::quant::{OutputStage, QuantizationParams};
use piedense::tensor::Tensor;

fn make_random(n: usize, seed: &mut u64) -> Vec<i8> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((*seed >> 56) as i8);
    }
    out
}

fn bench_dense(c: &mut Criterion) {
    // modest layer; adjust as needed
    let (batches, depth, out_dim) = (4usize, 256usize, 64usize);
    let mut seed = 0x1234_5678_9abc_def0u64;
    let iq = QuantizationParams::per_tensor(0.05, 3).unwrap();
    let fq = QuantizationParams::per_tensor(0.01, 0).unwrap();
    let oq = QuantizationParams::per_tensor(0.5, -2).unwrap();
    let input = Tensor::from_vec(&[batches, depth], make_random(batches * depth, &mut seed), iq).unwrap();
    let filter = Tensor::from_vec(&[depth, out_dim], make_random(depth * out_dim, &mut seed), fq).unwrap();
    let bias = Tensor::from_vec(&[out_dim], vec![100i32; out_dim], QuantizationParams::per_tensor(0.0005, 0).unwrap()).unwrap();
    let stage = OutputStage::from_real_multiplier(0.05 * 0.01 / 0.5).unwrap();
    let mut out = Tensor::<i8>::zeros(&[batches, out_dim], oq).unwrap();

    c.bench_function("fully_connected_with_bias_4x256x64", |ben| {
        ben.iter(|| {
            fully_connected_with_bias(&mut out, black_box(&input), black_box(&filter), &bias, &stage).unwrap();
        })
    });
    c.bench_function("fully_connected_reference_4x256x64", |ben| {
        ben.iter(|| {
            fully_connected_reference(&mut out, black_box(&input), black_box(&filter), &bias, -128, 127).unwrap();
        })
    });
}

criterion_group!(benches, bench_dense);
criterion_main!(benches);
