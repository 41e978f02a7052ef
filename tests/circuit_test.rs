mod utils;

use ark_bls12_381::Fr;
use ark_ff::UniformRand;
use ark_std::test_rng;
use starmpc::{Circuit, OfflineCircuit, ProtocolParams};
use utils::{deal_inputs, run_protocol};

fn params() -> ProtocolParams {
    ProtocolParams::new(7, 4)
}

#[tokio::test]
async fn addition_and_subtraction_of_negative_values() {
    let params = params();
    let mut rng = test_rng();
    let a_shares = deal_inputs(&params, &[Some(Fr::from(5u64))], &mut rng);
    let b_shares = deal_inputs(&params, &[Some(-Fr::from(3u64))], &mut rng);

    let mut offline: OfflineCircuit<Fr> = OfflineCircuit::new(params.clone());
    let a = offline.input(1);
    let b = offline.input(1);
    let sum = offline.add(&[a, b]).unwrap();
    let diff = offline.subtract(a, b).unwrap();
    let sum_out = offline.output(sum).unwrap();
    let diff_out = offline.output(diff).unwrap();
    offline.add_endpoint(sum_out).unwrap();
    offline.add_endpoint(diff_out).unwrap();

    let mut circuits = Vec::new();
    for party in 0..params.n_parties {
        let mut circuit: Circuit<Fr> = Circuit::new(params.clone());
        let a = circuit.input(1);
        let b = circuit.input(1);
        circuit.assign_input(a, a_shares[party].clone()).unwrap();
        circuit.assign_input(b, b_shares[party].clone()).unwrap();
        let sum = circuit.add(&[a, b]).unwrap();
        let diff = circuit.subtract(a, b).unwrap();
        let sum_out = circuit.output(sum).unwrap();
        let diff_out = circuit.output(diff).unwrap();
        circuit.set_output_name(sum_out, "sum").unwrap();
        circuit.set_output_name(diff_out, "diff").unwrap();
        circuit.add_endpoint(sum_out).unwrap();
        circuit.add_endpoint(diff_out).unwrap();
        circuits.push(circuit);
    }

    let (outputs, _) = run_protocol(params, offline, circuits).await.unwrap();
    assert_eq!(
        outputs,
        vec![
            ("sum".to_string(), vec![Some(Fr::from(2u64))]),
            ("diff".to_string(), vec![Some(Fr::from(8u64))]),
        ]
    );
}

#[tokio::test]
async fn beaver_multiplication_of_random_vectors() {
    let params = params();
    let mut rng = test_rng();
    let x: Vec<Fr> = (0..3).map(|_| Fr::rand(&mut rng)).collect();
    let y: Vec<Fr> = (0..3).map(|_| Fr::rand(&mut rng)).collect();
    let expected: Vec<Option<Fr>> = x.iter().zip(&y).map(|(a, b)| Some(*a * *b)).collect();

    let x_values: Vec<Option<Fr>> = x.iter().copied().map(Some).collect();
    let y_values: Vec<Option<Fr>> = y.iter().copied().map(Some).collect();
    let x_shares = deal_inputs(&params, &x_values, &mut rng);
    let y_shares = deal_inputs(&params, &y_values, &mut rng);

    let mut offline: OfflineCircuit<Fr> = OfflineCircuit::new(params.clone());
    let a = offline.input(3);
    let b = offline.input(3);
    let product = offline.elem_wise_multiply(a, b).unwrap();
    let out = offline.output(product).unwrap();
    offline.add_endpoint(out).unwrap();

    let mut circuits = Vec::new();
    for party in 0..params.n_parties {
        let mut circuit: Circuit<Fr> = Circuit::new(params.clone());
        let a = circuit.input(3);
        let b = circuit.input(3);
        circuit.assign_input(a, x_shares[party].clone()).unwrap();
        circuit.assign_input(b, y_shares[party].clone()).unwrap();
        let product = circuit.elem_wise_multiply(a, b).unwrap();
        let out = circuit.output(product).unwrap();
        circuit.add_endpoint(out).unwrap();
        circuits.push(circuit);
    }

    let (outputs, _) = run_protocol(params, offline, circuits).await.unwrap();
    assert_eq!(outputs, vec![(String::new(), expected)]);
}

#[tokio::test]
async fn scaling_constants_and_multi_input_addition() {
    let params = params();
    let mut rng = test_rng();
    let values = [Fr::from(5u64), Fr::from(11u64), Fr::from(20u64)];
    let shares: Vec<_> = values
        .iter()
        .map(|v| deal_inputs(&params, &[Some(*v)], &mut rng))
        .collect();

    let mut offline: OfflineCircuit<Fr> = OfflineCircuit::new(params.clone());
    let inputs: Vec<_> = (0..3).map(|_| offline.input(1)).collect();
    let total = offline.add(&inputs).unwrap();
    let scaled = offline.scaling(total, Fr::from(3u64)).unwrap();
    let shifted = offline.add_constant(scaled).unwrap();
    let out = offline.output(shifted).unwrap();
    offline.add_endpoint(out).unwrap();

    let mut circuits = Vec::new();
    for party in 0..params.n_parties {
        let mut circuit: Circuit<Fr> = Circuit::new(params.clone());
        let inputs: Vec<_> = (0..3).map(|_| circuit.input(1)).collect();
        for (gate, value_shares) in inputs.iter().zip(&shares) {
            circuit
                .assign_input(*gate, value_shares[party].clone())
                .unwrap();
        }
        let total = circuit.add(&inputs).unwrap();
        let scaled = circuit.scaling(total, Fr::from(3u64)).unwrap();
        let shifted = circuit
            .add_constant(scaled, vec![Fr::from(7u64)])
            .unwrap();
        let out = circuit.output(shifted).unwrap();
        circuit.add_endpoint(out).unwrap();
        circuits.push(circuit);
    }

    // (5 + 11 + 20) * 3 + 7
    let (outputs, _) = run_protocol(params, offline, circuits).await.unwrap();
    assert_eq!(outputs, vec![(String::new(), vec![Some(Fr::from(115u64))])]);
}

#[tokio::test]
async fn filtered_dot_product_skips_missing_dimensions() {
    let params = params();
    let mut rng = test_rng();
    let x_shares = deal_inputs(
        &params,
        &[Some(Fr::from(4u64)), Some(Fr::from(5u64))],
        &mut rng,
    );
    let y_shares = deal_inputs(&params, &[Some(Fr::from(6u64)), None], &mut rng);

    let mut offline: OfflineCircuit<Fr> = OfflineCircuit::new(params.clone());
    let a = offline.input(2);
    let b = offline.input(2);
    let dot = offline.dot_prod_with_filter(a, b).unwrap();
    let out = offline.output(dot).unwrap();
    offline.add_endpoint(out).unwrap();

    let mut circuits = Vec::new();
    for party in 0..params.n_parties {
        let mut circuit: Circuit<Fr> = Circuit::new(params.clone());
        let a = circuit.input(2);
        let b = circuit.input(2);
        circuit.assign_input(a, x_shares[party].clone()).unwrap();
        circuit.assign_input(b, y_shares[party].clone()).unwrap();
        let dot = circuit.dot_prod_with_filter(a, b).unwrap();
        let out = circuit.output(dot).unwrap();
        circuit.set_output_name(out, "dot").unwrap();
        circuit.add_endpoint(out).unwrap();
        circuits.push(circuit);
    }

    // The second dimension is excluded: 4 * 6 only.
    let (outputs, _) = run_protocol(params, offline, circuits).await.unwrap();
    assert_eq!(
        outputs,
        vec![("dot".to_string(), vec![Some(Fr::from(24u64))])]
    );
}

#[tokio::test]
async fn plain_dot_product_over_full_vectors() {
    let params = params();
    let mut rng = test_rng();
    let x_shares = deal_inputs(
        &params,
        &[Some(Fr::from(2u64)), Some(Fr::from(3u64))],
        &mut rng,
    );
    let y_shares = deal_inputs(
        &params,
        &[Some(Fr::from(4u64)), Some(Fr::from(5u64))],
        &mut rng,
    );

    let mut offline: OfflineCircuit<Fr> = OfflineCircuit::new(params.clone());
    let a = offline.input(2);
    let b = offline.input(2);
    let dot = offline.dot_product(a, b).unwrap();
    let out = offline.output(dot).unwrap();
    offline.add_endpoint(out).unwrap();

    let mut circuits = Vec::new();
    for party in 0..params.n_parties {
        let mut circuit: Circuit<Fr> = Circuit::new(params.clone());
        let a = circuit.input(2);
        let b = circuit.input(2);
        circuit.assign_input(a, x_shares[party].clone()).unwrap();
        circuit.assign_input(b, y_shares[party].clone()).unwrap();
        let dot = circuit.dot_product(a, b).unwrap();
        let out = circuit.output(dot).unwrap();
        circuit.add_endpoint(out).unwrap();
        circuits.push(circuit);
    }

    let (outputs, _) = run_protocol(params, offline, circuits).await.unwrap();
    assert_eq!(outputs, vec![(String::new(), vec![Some(Fr::from(23u64))])]);
}

#[tokio::test]
async fn elementwise_multiply_then_constant_factor() {
    let params = params();
    let mut rng = test_rng();
    let x_shares = deal_inputs(&params, &[Some(Fr::from(2u64))], &mut rng);
    let y_shares = deal_inputs(&params, &[Some(Fr::from(3u64))], &mut rng);

    let mut offline: OfflineCircuit<Fr> = OfflineCircuit::new(params.clone());
    let a = offline.input(1);
    let b = offline.input(1);
    let product = offline.elem_wise_mul_then_mul_const(a, b).unwrap();
    let out = offline.output(product).unwrap();
    offline.add_endpoint(out).unwrap();

    let mut circuits = Vec::new();
    for party in 0..params.n_parties {
        let mut circuit: Circuit<Fr> = Circuit::new(params.clone());
        let a = circuit.input(1);
        let b = circuit.input(1);
        circuit.assign_input(a, x_shares[party].clone()).unwrap();
        circuit.assign_input(b, y_shares[party].clone()).unwrap();
        let product = circuit
            .elem_wise_mul_then_mul_const(a, b, vec![Fr::from(5u64)])
            .unwrap();
        let out = circuit.output(product).unwrap();
        circuit.add_endpoint(out).unwrap();
        circuits.push(circuit);
    }

    let (outputs, _) = run_protocol(params, offline, circuits).await.unwrap();
    assert_eq!(outputs, vec![(String::new(), vec![Some(Fr::from(30u64))])]);
}

#[tokio::test]
async fn reduction_skips_nulls_and_honors_filters() {
    let params = params();
    let mut rng = test_rng();
    let values = [Some(Fr::from(4u64)), None, Some(Fr::from(5u64))];
    let shares = deal_inputs(&params, &values, &mut rng);

    let mut offline: OfflineCircuit<Fr> = OfflineCircuit::new(params.clone());
    let a = offline.input(3);
    let full = offline.reduce_sum(a).unwrap();
    let filtered = offline.reduce_sum(a).unwrap();
    let full_out = offline.output(full).unwrap();
    let filtered_out = offline.output(filtered).unwrap();
    offline.add_endpoint(full_out).unwrap();
    offline.add_endpoint(filtered_out).unwrap();

    let mut circuits = Vec::new();
    for party in 0..params.n_parties {
        let mut circuit: Circuit<Fr> = Circuit::new(params.clone());
        let a = circuit.input(3);
        circuit.assign_input(a, shares[party].clone()).unwrap();
        let full = circuit.reduce_sum(a, None).unwrap();
        let filtered = circuit
            .reduce_sum(a, Some(vec![true, true, false]))
            .unwrap();
        let full_out = circuit.output(full).unwrap();
        let filtered_out = circuit.output(filtered).unwrap();
        circuit.add_endpoint(full_out).unwrap();
        circuit.add_endpoint(filtered_out).unwrap();
        circuits.push(circuit);
    }

    let (outputs, _) = run_protocol(params, offline, circuits).await.unwrap();
    assert_eq!(
        outputs,
        vec![
            (String::new(), vec![Some(Fr::from(9u64))]),
            (String::new(), vec![Some(Fr::from(4u64))]),
        ]
    );
}

#[tokio::test]
async fn combination_concatenates_and_preserves_nulls() {
    let params = params();
    let mut rng = test_rng();
    let left = deal_inputs(&params, &[Some(Fr::from(1u64)), None], &mut rng);
    let right = deal_inputs(&params, &[Some(Fr::from(7u64))], &mut rng);

    let mut offline: OfflineCircuit<Fr> = OfflineCircuit::new(params.clone());
    let a = offline.input(2);
    let b = offline.input(1);
    let both = offline.combination(&[a, b]).unwrap();
    let out = offline.output(both).unwrap();
    offline.add_endpoint(out).unwrap();

    let mut circuits = Vec::new();
    for party in 0..params.n_parties {
        let mut circuit: Circuit<Fr> = Circuit::new(params.clone());
        let a = circuit.input(2);
        let b = circuit.input(1);
        circuit.assign_input(a, left[party].clone()).unwrap();
        circuit.assign_input(b, right[party].clone()).unwrap();
        let both = circuit.combination(&[a, b]).unwrap();
        let out = circuit.output(both).unwrap();
        circuit.add_endpoint(out).unwrap();
        circuits.push(circuit);
    }

    let (outputs, _) = run_protocol(params, offline, circuits).await.unwrap();
    assert_eq!(
        outputs,
        vec![(
            String::new(),
            vec![Some(Fr::from(1u64)), None, Some(Fr::from(7u64))]
        )]
    );
}

#[tokio::test]
async fn shared_gates_evaluate_once_per_pass() {
    let params = params();
    let mut rng = test_rng();
    let x_shares = deal_inputs(&params, &[Some(Fr::from(6u64))], &mut rng);
    let y_shares = deal_inputs(&params, &[Some(Fr::from(7u64))], &mut rng);

    let mut offline: OfflineCircuit<Fr> = OfflineCircuit::new(params.clone());
    let a = offline.input(1);
    let b = offline.input(1);
    let product = offline.elem_wise_multiply(a, b).unwrap();
    let out1 = offline.output(product).unwrap();
    let out2 = offline.output(product).unwrap();
    offline.add_endpoint(out1).unwrap();
    offline.add_endpoint(out2).unwrap();

    let mut circuits = Vec::new();
    for party in 0..params.n_parties {
        let mut circuit: Circuit<Fr> = Circuit::new(params.clone());
        let a = circuit.input(1);
        let b = circuit.input(1);
        circuit.assign_input(a, x_shares[party].clone()).unwrap();
        circuit.assign_input(b, y_shares[party].clone()).unwrap();
        let product = circuit.elem_wise_multiply(a, b).unwrap();
        let out1 = circuit.output(product).unwrap();
        let out2 = circuit.output(product).unwrap();
        circuit.add_endpoint(out1).unwrap();
        circuit.add_endpoint(out2).unwrap();
        circuits.push(circuit);
    }

    let (outputs, lines) = run_protocol(params, offline, circuits).await.unwrap();
    let expected = vec![Some(Fr::from(42u64))];
    assert_eq!(
        outputs,
        vec![(String::new(), expected.clone()), (String::new(), expected)]
    );
    // Two input masks plus one multiplication's randomness (a, b, c, lambda,
    // delta_x, delta_y): the product gate was consumed by two outputs but
    // read its tape entries exactly once.
    assert_eq!(lines, vec![2 + 6; 7]);
}

#[tokio::test]
async fn inputs_without_data_open_as_null() {
    let params = params();
    let mut rng = test_rng();
    let shares = deal_inputs(&params, &[Some(Fr::from(9u64)), None], &mut rng);

    let mut offline: OfflineCircuit<Fr> = OfflineCircuit::new(params.clone());
    let a = offline.input(2);
    let out = offline.output(a).unwrap();
    offline.add_endpoint(out).unwrap();

    let mut circuits = Vec::new();
    for party in 0..params.n_parties {
        let mut circuit: Circuit<Fr> = Circuit::new(params.clone());
        let a = circuit.input(2);
        circuit.assign_input(a, shares[party].clone()).unwrap();
        let out = circuit.output(a).unwrap();
        circuit.add_endpoint(out).unwrap();
        circuits.push(circuit);
    }

    let (outputs, _) = run_protocol(params, offline, circuits).await.unwrap();
    assert_eq!(
        outputs,
        vec![(String::new(), vec![Some(Fr::from(9u64)), None])]
    );
}
