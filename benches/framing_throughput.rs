use std::time::Instant;

use fid_link::device_a::commands::cmd_id;
use fid_link::device_a::frame::{encode_command, Deframer, SYNC_RESPONSE};

fn bench_encode(name: &str, payload_len: usize, iterations: usize) {
    let payload = vec![0u8; payload_len];

    let start = Instant::now();
    let mut total_bytes = 0u64;
    for _ in 0..iterations {
        let frame = encode_command(cmd_id::READ_DATA_EXTENDED, &payload);
        total_bytes += frame.len() as u64;
    }
    let elapsed = start.elapsed();

    let throughput = (iterations as f64) / elapsed.as_secs_f64();
    println!("{name}: payload {payload_len} bytes");
    println!("  Total time: {elapsed:?}");
    println!("  Throughput: {throughput:.0} frames/sec");
    println!("  Bytes/sec: {:.0}", total_bytes as f64 / elapsed.as_secs_f64());
}

fn bench_decode(name: &str, payload_len: usize, iterations: usize) {
    let mut frame = encode_command(cmd_id::READ_DATA_EXTENDED, &vec![0u8; payload_len]);
    frame[0] = SYNC_RESPONSE;

    let start = Instant::now();
    let mut decoded_count = 0u64;
    for _ in 0..iterations {
        let mut deframer = Deframer::new();
        for &b in &frame {
            if deframer.push_byte(b).is_some() {
                decoded_count += 1;
            }
        }
    }
    let elapsed = start.elapsed();

    let throughput = (iterations as f64) / elapsed.as_secs_f64();
    println!("{name}: payload {payload_len} bytes, decoded {decoded_count}");
    println!("  Total time: {elapsed:?}");
    println!("  Throughput: {throughput:.0} frames/sec");
}

fn main() {
    let iterations = 200_000;
    let payload_sizes = [0usize, 9, 21];

    println!("=== Device-A Framing Throughput ===");
    println!("Iterations: {iterations}\n");

    for &size in &payload_sizes {
        println!("--- Payload size: {size} bytes ---");
        bench_encode("encode", size, iterations);
        bench_decode("decode", size, iterations);
        println!();
    }
}
