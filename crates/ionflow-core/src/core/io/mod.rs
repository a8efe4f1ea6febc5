pub mod poscar;
