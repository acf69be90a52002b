//! Integration tests for the on-disk containers.

use arbor::distance::{EuclideanDistance, PrimitiveDistance};
use arbor::relation::Relation;
use arbor_int_test::test_util::{cleanup, create_uniform_context, run_test};
use arbor_spatial::OnDiskUpperTriangleMatrix;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_distance_matrix_round_trip() {
    run_test(
        || create_uniform_context(40, 3, 2),
        |ctx| {
            let relation = ctx.relation();
            let ids = relation.dbids();
            let path = ctx.file("distances.matrix");

            {
                let mut matrix = OnDiskUpperTriangleMatrix::create(&path, 8, 8, ids.len())?;
                matrix.write_extra_header(&(ids.len() as u64).to_le_bytes())?;
                for i in 0..ids.len() {
                    let a = relation.get(ids[i]).unwrap();
                    for j in i..ids.len() {
                        let b = relation.get(ids[j]).unwrap();
                        let d = EuclideanDistance.distance(&a, &b);
                        matrix.write_record(i, j, &d.to_le_bytes())?;
                    }
                }
                matrix.close()?;
            }

            let matrix = OnDiskUpperTriangleMatrix::open(&path, 8, 8)?;
            assert_eq!(matrix.matrix_size(), ids.len());
            assert_eq!(matrix.extra_header(), &(ids.len() as u64).to_le_bytes());
            for i in 0..ids.len() {
                for j in 0..ids.len() {
                    let raw: [u8; 8] = matrix.record(i, j)?.try_into().unwrap();
                    let stored = f64::from_le_bytes(raw);
                    let a = relation.get(ids[i]).unwrap();
                    let b = relation.get(ids[j]).unwrap();
                    // cells are shared by (i, j) and (j, i)
                    let (lo, hi) = if i <= j { (&a, &b) } else { (&b, &a) };
                    assert_eq!(stored, EuclideanDistance.distance(lo, hi));
                }
                assert_eq!(f64::from_le_bytes(matrix.record(i, i)?.try_into().unwrap()), 0.0);
            }
            Ok(())
        },
        cleanup,
    )
}
