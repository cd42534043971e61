use std::collections::BTreeMap;
use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use assurance_assessments::{
    AnswerFact, AnswerText, ControlNumber, RiskRating, StatisticsInput, compute_statistics,
};
use assurance_core::SubDepartmentId;

fn build_input(sub_departments: usize, questions_per_sub: usize) -> StatisticsInput {
    let subs: Vec<SubDepartmentId> = (0..sub_departments).map(|_| SubDepartmentId::new()).collect();
    let mut input = StatisticsInput {
        question_counts: subs.iter().map(|&s| (s, questions_per_sub as u64)).collect::<BTreeMap<_, _>>(),
        answers: Vec::with_capacity(sub_departments * questions_per_sub),
    };

    let ratings = [RiskRating::Critical, RiskRating::High, RiskRating::Medium, RiskRating::Low];
    for (s, &sub) in subs.iter().enumerate() {
        for q in 0..questions_per_sub {
            let answer_text = AnswerText::ALL[(s + q) % 3];
            input.answers.push(AnswerFact {
                sub_department_id: sub,
                answer_text,
                control_numbers: vec![
                    ControlNumber::new(format!("A.{}-{}", q % 14, q)).expect("valid control"),
                ],
                risk_rating: (q % 2 == 0).then(|| ratings[q % 4]),
            });
        }
    }
    input
}

fn bench_compute_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_statistics");

    for (subs, per_sub) in [(4, 50), (20, 100), (50, 200)] {
        let input = build_input(subs, per_sub);
        group.throughput(Throughput::Elements(input.answers.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{subs}x{per_sub}")),
            &input,
            |b, input| b.iter(|| compute_statistics(black_box(input))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_compute_statistics);
criterion_main!(benches);
