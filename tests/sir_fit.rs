use approx::assert_relative_eq;
use sirfit::prelude::*;

fn sir_dataset(target: Compartment) -> Dataset {
    let trajectory = simulate_sir(
        &SirParams::default(),
        DEFAULT_X0,
        &time_points(DEFAULT_TIME_POINTS),
    )
    .unwrap();
    Dataset::from_trajectory(&trajectory, target).unwrap()
}

#[test]
fn trajectory_conserves_population() {
    let trajectory = simulate_sir(&SirParams::default(), DEFAULT_X0, &time_points(60)).unwrap();
    let total: f64 = DEFAULT_X0.iter().sum();
    for row in trajectory.states().rows() {
        assert_relative_eq!(row.sum(), total, epsilon = 1e-6);
    }
}

#[test]
fn compartment_datasets_share_inputs() {
    let s = sir_dataset(Compartment::S);
    let i = sir_dataset(Compartment::I);
    let r = sir_dataset(Compartment::R);

    assert_eq!(s.nrows(), DEFAULT_TIME_POINTS - 2);
    assert_eq!(s.inputs(), i.inputs());
    assert_eq!(i.inputs(), r.inputs());

    // ds + di + dr = 0 for every row
    for k in 0..s.nrows() {
        let sum = s.targets()[k] + i.targets()[k] + r.targets()[k];
        assert!(sum.abs() < 1e-7, "row {k}: {sum}");
    }
}

#[test]
fn known_susceptible_law_has_small_error() {
    // ds/dt = -beta * s * i
    let dataset = sir_dataset(Compartment::S);
    let layers = vec![vec![Basis::Multiply], vec![Basis::MultiplyConstant]];
    let mut network = Network::builder(2, layers)
        .skip_connections(false)
        .build()
        .unwrap();
    // product of x0 and x1, scaled by a constant, routed to the output
    let function = network.function(vec![0, 1, 0, 0]).unwrap();
    network.set_constants(vec![1.0]).unwrap();
    let predictions = network.forward_fit_constants(&function, &dataset).unwrap();

    assert_relative_eq!(network.constants()[0], -0.5, epsilon = 0.1);
    assert!(mse(predictions.view(), dataset.targets()) < 1e-4);
    assert!(network
        .apply_symbolic_constant(&function)
        .ends_with("*x0*x1"));
}
