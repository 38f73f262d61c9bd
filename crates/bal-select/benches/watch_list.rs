//! Watch list operations at select(2)-sized populations.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use bal_core::{AsyncSocket, BalResult, Descriptor, Interest, PeekStatus, SocketFlags};
use bal_select::{Callback, DescriptorSet, WatchEntry, WatchList};

struct BenchSocket {
    sd: Descriptor,
    flags: SocketFlags,
}

impl AsyncSocket for BenchSocket {
    fn descriptor(&self) -> Descriptor {
        self.sd
    }

    fn flags(&self) -> &SocketFlags {
        &self.flags
    }

    fn peek(&self) -> PeekStatus {
        PeekStatus::WouldBlock
    }

    fn set_nonblocking(&self, _nonblocking: bool) -> BalResult<()> {
        Ok(())
    }
}

fn entry(sd: Descriptor) -> WatchEntry<BenchSocket> {
    let cb: Callback<BenchSocket> = Arc::new(|_, _| {});
    WatchEntry::new(Arc::new(BenchSocket { sd, flags: SocketFlags::new() }), Interest::READ, cb)
}

fn filled(n: usize) -> WatchList<BenchSocket> {
    let mut list = WatchList::with_capacity(n + 1);
    for sd in 0..n as Descriptor {
        let _ = list.add(entry(sd));
    }
    list
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("watch_list_find_last");
    for n in [16usize, 256, 1023] {
        let list = filled(n);
        let last = (n - 1) as Descriptor;
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(list.find(black_box(last)).is_some()))
        });
    }
    group.finish();
}

fn bench_traverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("watch_list_build_sets");
    for n in [16usize, 256, 1023] {
        let mut list = filled(n);
        let mut set = DescriptorSet::with_max(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                set.clear();
                list.reset_cursor();
                while let Some(key) = list.advance() {
                    if let Some(e) = list.get(key) {
                        set.insert(e.descriptor());
                    }
                }
                black_box(set.count())
            })
        });
    }
    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    c.bench_function("watch_list_add_remove_256", |b| {
        let mut list = filled(255);
        b.iter(|| {
            list.add(entry(900)).ok();
            black_box(list.remove(900))
        })
    });
}

criterion_group!(benches, bench_find, bench_traverse, bench_churn);
criterion_main!(benches);
